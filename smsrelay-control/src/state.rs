//! Shared application state handed to every route handler.
//!
//! Assembled once by the composition root and cloned (cheaply, via `Arc`)
//! into each `axum` handler, in place of ambient singleton globals.

use std::sync::Arc;

use smsrelay_common::RetryPolicy;
use smsrelay_dispatch::{Dispatcher, Maintenance, Scheduler};
use smsrelay_health::HealthChecker;
use smsrelay_store::{PriorityQueue, Store};
use smsrelay_telemetry::Metrics;

use crate::config::ControlConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub queue: Arc<PriorityQueue<dyn Store>>,
    pub scheduler: Arc<Scheduler<dyn Store>>,
    pub maintenance: Arc<Maintenance<dyn Store>>,
    pub dispatcher: Arc<Dispatcher<dyn Store, dyn smsrelay_dispatch::Transport>>,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthChecker>,
    pub config: ControlConfig,
    /// Retry policy a submission gets when it omits one of its own; built
    /// from the composition root's `[retry]` config section. The wire
    /// contract has no per-submission retry override.
    pub default_retry_policy: RetryPolicy,
}
