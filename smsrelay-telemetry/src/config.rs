//! Telemetry configuration

use std::collections::HashMap;

use serde::Deserialize;

use crate::metrics::Thresholds;

/// Configuration for the event bus and metrics registry
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Enable or disable telemetry collection
    ///
    /// When disabled, the composition root skips constructing an event
    /// bus and metrics registry; components holding an `Option<Arc<_>>`
    /// simply see `None` and record nothing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-subscriber mailbox capacity on the event bus
    ///
    /// A subscriber that falls behind this many events drops its oldest
    /// queued event rather than applying backpressure to `publish`.
    ///
    /// Default: 1000
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Alert thresholds keyed by metric name
    ///
    /// Applied via `Metrics::set_threshold` at startup. A metric with no
    /// entry here never emits an alert.
    #[serde(default)]
    pub thresholds: HashMap<String, Thresholds>,
}

const fn default_enabled() -> bool {
    true
}

const fn default_mailbox_capacity() -> usize {
    1_000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            mailbox_capacity: default_mailbox_capacity(),
            thresholds: HashMap::new(),
        }
    }
}
