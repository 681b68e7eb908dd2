//! Error types for the telemetry crate

use thiserror::Error;

/// Errors that can occur while operating the event bus or metrics
/// registry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A `subscribe` call named a subscriber id that is no longer
    /// registered (already unsubscribed).
    #[error("subscription {0} not found")]
    UnknownSubscription(u64),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
