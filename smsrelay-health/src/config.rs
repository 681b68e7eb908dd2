//! Health check configuration

use serde::Deserialize;

/// Configuration for health rollup thresholds and the health HTTP server
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Enable or disable the health check server
    ///
    /// When disabled, the health server will not start.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Address to bind the health check server
    ///
    /// Common values:
    /// - `[::]:8080` (IPv6 any address, port 8080)
    /// - `0.0.0.0:8080` (IPv4 any address, port 8080)
    /// - `127.0.0.1:8080` (localhost only, port 8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Queue depth at or above which the queue component is WARNING
    #[serde(default = "default_queue_depth_warning")]
    pub queue_depth_warning: u64,

    /// Queue depth at or above which the queue component is CRITICAL
    #[serde(default = "default_queue_depth_critical")]
    pub queue_depth_critical: u64,

    /// Error rate (0.0-1.0) over the trailing hour at or above which the
    /// error-rate component is WARNING
    #[serde(default = "default_error_rate_warning")]
    pub error_rate_warning: f64,

    /// Error rate (0.0-1.0) over the trailing hour at or above which the
    /// error-rate component is CRITICAL
    #[serde(default = "default_error_rate_critical")]
    pub error_rate_critical: f64,

    /// Milliseconds since the transport's last success at or above which
    /// the transport component is WARNING
    #[serde(default = "default_transport_stale_warning_ms")]
    pub transport_stale_warning_ms: u64,

    /// Milliseconds since the transport's last success at or above which
    /// the transport component is CRITICAL
    #[serde(default = "default_transport_stale_critical_ms")]
    pub transport_stale_critical_ms: u64,

    /// How often the composition root polls the store to refresh
    /// `queue_depth`/`store_reachable` on the checker.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

const fn default_enabled() -> bool {
    true
}

fn default_listen_address() -> String {
    "[::]:8080".to_string()
}

const fn default_queue_depth_warning() -> u64 {
    1_000
}

const fn default_queue_depth_critical() -> u64 {
    10_000
}

const fn default_error_rate_warning() -> f64 {
    0.1
}

const fn default_error_rate_critical() -> f64 {
    0.5
}

const fn default_transport_stale_warning_ms() -> u64 {
    5 * 60 * 1_000
}

const fn default_transport_stale_critical_ms() -> u64 {
    30 * 60 * 1_000
}

const fn default_probe_interval_ms() -> u64 {
    5_000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_address: default_listen_address(),
            queue_depth_warning: default_queue_depth_warning(),
            queue_depth_critical: default_queue_depth_critical(),
            error_rate_warning: default_error_rate_warning(),
            error_rate_critical: default_error_rate_critical(),
            transport_stale_warning_ms: default_transport_stale_warning_ms(),
            transport_stale_critical_ms: default_transport_stale_critical_ms(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}
