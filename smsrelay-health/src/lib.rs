//! Health rollup and HTTP health endpoints for smsrelay.
//!
//! This crate provides the health rollup (`HealthChecker`) and the
//! `/health` and `/health/detailed` HTTP endpoints the control surface
//! exposes alongside it. Other components push signals into the checker
//! (store reachability, queue depth, transport outcomes) via setters; the
//! checker never reaches back into Store or Dispatch, so this crate
//! depends on nothing but `smsrelay-common`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use smsrelay_health::{HealthChecker, HealthConfig, HealthServer};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HealthConfig::default();
//! let checker = Arc::new(HealthChecker::new(config.clone()));
//! let server = HealthServer::new(config, checker).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

mod checker;
mod config;
mod error;
mod server;

pub use checker::{ComponentHealth, HealthChecker, HealthReport, Status};
pub use config::HealthConfig;
pub use error::HealthError;
pub use server::HealthServer;
