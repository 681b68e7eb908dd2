//! Durable message store, priority queue ordering and indexed queries —
//! the single source of truth every other component reads from and writes
//! to.
#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod backends;
pub mod config;
pub mod error;
pub mod queue;
pub mod store;

pub use backends::MemoryStore;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use queue::PriorityQueue;
pub use store::{Store, Transition};
