//! Error types for the smsrelay-store crate.

use thiserror::Error;

use smsrelay_common::MessageId;

/// Top-level store error type.
///
/// Any driver error surfaces here as a `StoreFault`; callers must not
/// interpret it as a message-level failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this id exists.
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// A conditional update (`UpdateState`) was attempted against a record
    /// whose current state no longer matches the expected `from` state.
    /// This is a concurrency conflict: callers retry against the latest
    /// state rather than surfacing it.
    #[error("conflicting state for message {id}: expected {expected}, found {actual}")]
    Conflict {
        id: MessageId,
        expected: smsrelay_common::MessageState,
        actual: smsrelay_common::MessageState,
    },

    /// The configured capacity bound has been reached.
    #[error("store capacity exceeded: {0}/{1} messages")]
    CapacityExceeded(usize, usize),

    /// Internal fault (lock poisoning, backend I/O, etc). Retriable by the
    /// caller with bounded backoff.
    #[error("store fault: {0}")]
    Fault(String),
}

impl StoreError {
    /// Whether a caller should retry the operation internally rather than
    /// surface it to an end user.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Fault(format!("lock poisoned: {e}"))
    }
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_is_retriable_not_found_is_not() {
        let fault = StoreError::Fault("disk full".into());
        assert!(fault.is_fault());
        assert!(!fault.is_not_found());

        let not_found = StoreError::NotFound(MessageId::generate());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_fault());
    }
}
