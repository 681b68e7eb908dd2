//! Event bus and metrics for smsrelay.
//!
//! Two small, independently injectable registries: [`EventBus`] for
//! lifecycle events and [`Metrics`] for counters/gauges/histograms with
//! threshold-driven alerting. Neither holds process-global state; the
//! composition root owns one `Arc` of each and hands clones to whichever
//! components need them.
//!
//! # Usage
//!
//! ```rust,no_run
//! use smsrelay_telemetry::{EventBus, Metrics, TelemetryConfig};
//!
//! let config = TelemetryConfig::default();
//! let events = std::sync::Arc::new(EventBus::new(config.mailbox_capacity));
//! let metrics = Metrics::new(Some(events.clone()));
//! ```

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;

pub use bus::{EventBus, SubscriptionHandle};
pub use config::TelemetryConfig;
pub use error::{Result, TelemetryError};
pub use events::{Component, Event, EventHeader, EventKind};
pub use metrics::{AlertLevel, HistogramSnapshot, Metrics, Thresholds};
