//! Error types for the smsrelay-dispatch crate (Scheduler, Retry Engine,
//! Dispatcher, Maintenance).

use thiserror::Error;

use smsrelay_common::MessageId;
use smsrelay_store::StoreError;

/// Top-level dispatch-pipeline error type.
///
/// Crate-boundary errors convert into each other via `#[from]` rather
/// than being stringified at the point they cross a boundary.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Propagated from the Store. A fault is retried internally with
    /// bounded backoff by the caller, not surfaced as a message-level
    /// outcome.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Control-surface request against a message id that does not exist.
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// A requested transition is illegal in the message's current state
    /// (e.g. reprioritizing a `SENDING` message).
    #[error("illegal transition for message {0}: {1}")]
    IllegalTransition(MessageId, &'static str),
}

impl DispatchError {
    /// Whether this error is a Store fault that should be retried
    /// internally rather than surfaced as a message-level failure.
    #[must_use]
    pub const fn is_store_fault(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_fault())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::Store(e) if e.is_not_found())
    }
}

/// Errors surfaced by a [`crate::transport::Transport`] implementation.
///
/// Carries the raw error text the Retry Engine classifies by
/// case-insensitive substring match; `code` is an optional
/// transport-specific identifier kept for diagnostics only.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub code: Option<String>,
    pub message: String,
}

impl TransportError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Specialized `Result` type for dispatch-pipeline operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
