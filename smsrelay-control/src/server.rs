//! Binds the control router to a TCP listener and serves it, racing
//! against the process-wide shutdown broadcast the same way
//! [`smsrelay_health::HealthServer`] does.

use smsrelay_common::Signal;
use tokio::{net::TcpListener, sync::broadcast};

use crate::{routes::router, state::AppState};

/// Errors standing up the control surface's HTTP listener.
#[derive(Debug, thiserror::Error)]
pub enum ControlServerError {
    #[error("failed to bind control listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct ControlServer {
    listener: TcpListener,
    state: AppState,
}

impl ControlServer {
    /// Binds `state.config.listen_address`.
    ///
    /// # Errors
    /// Returns [`ControlServerError::Bind`] if the address cannot be bound.
    pub async fn new(state: AppState) -> Result<Self, ControlServerError> {
        let address = state.config.listen_address.clone();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ControlServerError::Bind { address, source })?;
        Ok(Self { listener, state })
    }

    /// # Errors
    /// Propagates the underlying socket's `local_addr` failure.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves the control router until `shutdown` fires.
    ///
    /// # Errors
    /// Propagates any I/O error from the underlying `axum::serve` future.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> std::io::Result<()> {
        let app = router(self.state);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await
    }
}
