//! Small timestamp helpers shared by every component that writes to the
//! Message entity's millisecond-epoch fields.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as milliseconds since the Unix epoch.
///
/// # Panics
///
/// Panics if the system clock is set before the epoch, which would
/// indicate a badly misconfigured host rather than a recoverable error.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}
