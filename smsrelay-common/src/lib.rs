//! Shared types, error taxonomy and structured logging used across the
//! smsrelay workspace.

pub mod logging;
pub mod message;
pub mod time;

/// A broadcast signal used to fan shutdown out to every long-running loop
/// in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The process is shutting down; every loop should finish its current
    /// unit of work and return.
    Shutdown,
}

pub use logging::Category;
pub use message::{
    Message, MessageId, MessageState, Priority, RetryPolicy, RetryStrategy, ValidationError,
    payload_exceeds_single_segment, validate_destination, PAYLOAD_WARN_LEN,
};
pub use time::now_millis;
