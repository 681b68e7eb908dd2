//! Configuration for the Scheduler, Retry Engine, Dispatcher and
//! Maintenance, one sub-config section per component.

use serde::Deserialize;
use smsrelay_common::RetryStrategy;

/// Configuration consumed by [`crate::retry::RetryEngine`].
///
/// Per-message [`smsrelay_common::RetryPolicy`] values still take
/// precedence for `max_attempts`/`strategy`/delays; this supplies the
/// defaults a freshly submitted message gets when the caller omits a
/// policy of its own, plus a jitter knob that tests can disable for
/// deterministic delays.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts_default: u32,
    #[serde(default = "default_strategy")]
    pub strategy_default: RetryStrategy,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Uniform jitter applied to `EXPONENTIAL` delays, e.g. `0.25` for
    /// ±25% (distribution confirmed in `DESIGN.md`).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Disables jitter entirely so repeated calls with identical inputs
    /// are bit-for-bit deterministic.
    #[serde(default = "default_jitter_enabled")]
    pub jitter_enabled: bool,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_strategy() -> RetryStrategy {
    RetryStrategy::Exponential
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

const fn default_jitter_factor() -> f64 {
    0.25
}

const fn default_jitter_enabled() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts_default: default_max_attempts(),
            strategy_default: default_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
            jitter_enabled: default_jitter_enabled(),
        }
    }
}

/// Configuration consumed by [`crate::scheduler::Scheduler`].
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_interval_ms")]
    pub scheduler_interval_ms: u64,
    /// A `SCHEDULED` row whose `scheduled_at` predates
    /// `now - expiration_window_ms` expires instead of promoting.
    #[serde(default = "default_expiration_window_ms")]
    pub expiration_window_ms: u64,
}

const fn default_scheduler_interval_ms() -> u64 {
    60_000
}

const fn default_expiration_window_ms() -> u64 {
    24 * 60 * 60 * 1_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_ms: default_scheduler_interval_ms(),
            expiration_window_ms: default_expiration_window_ms(),
        }
    }
}

/// Configuration consumed by [`crate::dispatcher::Dispatcher`].
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Default `min(8, 2 * num_cpus)`, resolved at deserialization time
    /// by [`default_worker_count`] since it depends on the host rather
    /// than a fixed `const fn` value.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    #[serde(default = "default_idle_poll_max_ms")]
    pub idle_poll_max_ms: u64,
}

const fn default_send_timeout_ms() -> u64 {
    30_000
}

const fn default_idle_poll_ms() -> u64 {
    50
}

const fn default_idle_poll_max_ms() -> u64 {
    5_000
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            send_timeout_ms: default_send_timeout_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            idle_poll_max_ms: default_idle_poll_max_ms(),
        }
    }
}

/// `min(8, 2 * num_cpus)`.
#[must_use]
pub fn default_worker_count() -> usize {
    (2 * num_cpus::get()).min(8).max(1)
}

/// Configuration consumed by [`crate::maintenance::Maintenance`].
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,
    #[serde(default = "default_retention_sent_days")]
    pub retention_sent_days: u64,
    #[serde(default = "default_retention_failed_days")]
    pub retention_failed_days: u64,
    #[serde(default = "default_sending_rescue_after_ms")]
    pub sending_rescue_after_ms: u64,
}

const fn default_maintenance_interval_ms() -> u64 {
    24 * 60 * 60 * 1_000
}

const fn default_retention_sent_days() -> u64 {
    14
}

const fn default_retention_failed_days() -> u64 {
    7
}

const fn default_sending_rescue_after_ms() -> u64 {
    60 * 60 * 1_000
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            maintenance_interval_ms: default_maintenance_interval_ms(),
            retention_sent_days: default_retention_sent_days(),
            retention_failed_days: default_retention_failed_days(),
            sending_rescue_after_ms: default_sending_rescue_after_ms(),
        }
    }
}
