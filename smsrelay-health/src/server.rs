//! Health check HTTP server

use std::{sync::Arc, time::Duration};

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use smsrelay_common::Signal;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::{HealthChecker, HealthConfig, HealthError, Status};

/// Health check HTTP server.
///
/// Provides `/health` (liveness plus overall verdict) and
/// `/health/detailed` (full per-component report).
pub struct HealthServer {
    listener: TcpListener,
    router: Router,
}

impl HealthServer {
    /// Create a new health server.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn new(
        config: HealthConfig,
        health_checker: Arc<HealthChecker>,
    ) -> Result<Self, HealthError> {
        let listener =
            TcpListener::bind(&config.listen_address)
                .await
                .map_err(|e| HealthError::BindError {
                    address: config.listen_address.clone(),
                    source: e,
                })?;

        tracing::info!(
            address = %config.listen_address,
            "Health check server bound successfully"
        );

        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/health/detailed", get(health_detailed_handler))
            .with_state(health_checker)
            .layer(TimeoutLayer::new(Duration::from_secs(1)));

        Ok(Self { listener, router })
    }

    /// Run the health server until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), HealthError> {
        tracing::info!("Health check server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Health check server received shutdown signal");
            })
            .await
            .map_err(|e| HealthError::ServerError(e.to_string()))?;

        tracing::info!("Health check server stopped");
        Ok(())
    }
}

fn status_code_for(overall: Status) -> StatusCode {
    match overall {
        Status::Healthy | Status::Warning => StatusCode::OK,
        Status::Critical | Status::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `GET /health` — overall verdict only, suitable for a liveness/load
/// balancer probe.
async fn health_handler(State(health_checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
    let report = health_checker.check();
    let code = status_code_for(report.overall);
    if code != StatusCode::OK {
        tracing::warn!(overall = %report.overall, issues = ?report.issues, "health check degraded");
    }
    (code, Json(serde_json::json!({ "overall": report.overall })))
}

/// `GET /health/detailed` — full per-component report with issues and
/// recommendations.
async fn health_detailed_handler(
    State(health_checker): State<Arc<HealthChecker>>,
) -> impl IntoResponse {
    let report = health_checker.check();
    let code = status_code_for(report.overall);
    (code, Json(report))
}
