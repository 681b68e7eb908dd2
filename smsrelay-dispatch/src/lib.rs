//! Scheduler, Retry Engine, Dispatcher and Maintenance — the concurrency
//! core of the message delivery pipeline.
//!
//! Each submodule owns one component: [`scheduler`] promotes
//! due `SCHEDULED` rows, [`retry`] is the pure retry-decision policy,
//! [`dispatcher`] runs the worker pool that claims and sends, and
//! [`maintenance`] is the periodic retention/rescue pass. All four share
//! nothing but the [`smsrelay_store::Store`] handle and the
//! [`smsrelay_telemetry::EventBus`] they publish to.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod dispatcher;
pub mod error;
pub mod maintenance;
pub mod retry;
pub mod scheduler;
pub mod transport;
pub mod types;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result, TransportError};
pub use maintenance::{Maintenance, MaintenanceOutcome};
pub use retry::{RetryDecision, RetryEngine};
pub use scheduler::{Scheduler, TickOutcome};
pub use transport::{LoggingTransport, ScriptedTransport, Transport};
pub use types::{DispatcherConfig, MaintenanceConfig, RetryConfig, SchedulerConfig};
