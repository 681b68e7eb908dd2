//! Configuration for the store backend.

use serde::Deserialize;

/// Configuration for the store.
///
/// Only an in-memory backend ships today (see `DESIGN.md`); `capacity`
/// bounds how many messages it will hold at once.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of messages the store will hold at once (omit for
    /// unlimited). Exceeding it surfaces as
    /// [`crate::error::StoreError::CapacityExceeded`] from `insert`.
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { capacity: None }
    }
}
