//! The Transport interface consumed by the Dispatcher.
//!
//! Implementations are explicitly out of scope: a production deployment
//! dispatches through the host platform's SMS API. This crate ships a
//! [`LoggingTransport`] stand-in for local running and the integration
//! tests, matching the way the rest of the ambient stack provides a
//! reference implementation for interfaces whose real backend is an
//! external collaborator.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TransportError;

/// `Send(recipient, content) -> Ok | Err(code, message)`.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Attempt delivery of `payload` to `destination`.
    ///
    /// # Errors
    /// Returns [`TransportError`] on any failure; the Retry Engine
    /// classifies `error.message` to decide whether it is retryable.
    async fn send(&self, destination: &str, payload: &str) -> Result<(), TransportError>;
}

/// Stand-in transport that logs every attempt and always succeeds.
///
/// Intended for local runs and as the default in tests that don't care
/// about transport behavior; [`ScriptedTransport`] below is used where
/// tests need specific failure sequences.
#[derive(Debug, Default)]
pub struct LoggingTransport {
    sent: AtomicU64,
}

impl LoggingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, destination: &str, payload: &str) -> Result<(), TransportError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        tracing::info!(destination, payload, "transport: delivered (stand-in)");
        Ok(())
    }
}

/// A scripted [`Transport`] used by the integration suite to exercise
/// retry scenarios: returns the outcomes in `script`, one per call,
/// repeating the last entry once exhausted.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: parking_lot::Mutex<std::collections::VecDeque<Result<(), TransportError>>>,
    calls: AtomicU64,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new(script: Vec<Result<(), TransportError>>) -> Self {
        Self {
            script: parking_lot::Mutex::new(script.into()),
            calls: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _destination: &str, _payload: &str) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut script = self.script.lock();
        match script.pop_front() {
            Some(outcome) => outcome,
            None => Ok(()),
        }
    }
}
