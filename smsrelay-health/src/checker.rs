//! Health rollup logic.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use parking_lot::Mutex;
use serde::Serialize;
use smsrelay_common::now_millis;

use crate::config::HealthConfig;

/// Per-component or overall health state. Ordered so a `worst wins`
/// rollup can be computed with a plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Healthy,
    Warning,
    Critical,
    Down,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Healthy => "HEALTHY",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Down => "DOWN",
        };
        write!(f, "{label}")
    }
}

/// A single component's contribution to the rollup.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: Status,
    pub detail: String,
}

/// Full health report returned by `/health/detailed` and consulted by the
/// Dispatcher to gate worker capacity.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall: Status,
    pub components: Vec<ComponentHealth>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Per-minute attempt/failure counts, so the error-rate check can discard
/// entries older than an hour without retaining every individual outcome.
#[derive(Debug)]
struct MinuteBucket {
    minute: u64,
    attempts: u64,
    failures: u64,
}

/// Tracks the inputs to the health rollup and computes it on demand.
///
/// Components push continuous signals — store reachability, queue depth,
/// attempt/failure counts, last successful send — and the rollup derives
/// a `{HEALTHY, WARNING, CRITICAL, DOWN}` verdict per component from
/// configured thresholds.
#[derive(Debug)]
pub struct HealthChecker {
    store_reachable: AtomicBool,
    queue_depth: AtomicU64,
    last_transport_success_ms: AtomicU64,
    buckets: Mutex<VecDeque<MinuteBucket>>,
    config: HealthConfig,
}

impl HealthChecker {
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self {
            store_reachable: AtomicBool::new(true),
            queue_depth: AtomicU64::new(0),
            last_transport_success_ms: AtomicU64::new(now_millis()),
            buckets: Mutex::new(VecDeque::new()),
            config,
        }
    }

    pub fn set_store_reachable(&self, reachable: bool) {
        self.store_reachable.store(reachable, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn record_transport_success(&self) {
        self.last_transport_success_ms
            .store(now_millis(), Ordering::Relaxed);
        self.record_attempt(false);
    }

    pub fn record_transport_failure(&self) {
        self.record_attempt(true);
    }

    fn record_attempt(&self, failed: bool) {
        let minute = now_millis() / 60_000;
        let mut buckets = self.buckets.lock();
        if buckets.back().is_none_or(|b| b.minute != minute) {
            buckets.push_back(MinuteBucket {
                minute,
                attempts: 0,
                failures: 0,
            });
        }
        let bucket = buckets.back_mut().expect("just pushed if empty");
        bucket.attempts += 1;
        if failed {
            bucket.failures += 1;
        }
        while buckets
            .front()
            .is_some_and(|b| minute.saturating_sub(b.minute) > 60)
        {
            buckets.pop_front();
        }
    }

    fn attempts_and_failures_last_hour(&self) -> (u64, u64) {
        let minute = now_millis() / 60_000;
        let buckets = self.buckets.lock();
        buckets
            .iter()
            .filter(|b| minute.saturating_sub(b.minute) <= 60)
            .fold((0u64, 0u64), |(a, f), b| (a + b.attempts, f + b.failures))
    }

    fn error_rate_last_hour(&self) -> f64 {
        let (attempts, failures) = self.attempts_and_failures_last_hour();
        if attempts == 0 {
            0.0
        } else {
            failures as f64 / attempts as f64
        }
    }

    /// Successful transport sends recorded over the trailing hour, the
    /// windowed counterpart to the lifetime `sms.sent` counter.
    #[must_use]
    pub fn successes_last_hour(&self) -> u64 {
        let (attempts, failures) = self.attempts_and_failures_last_hour();
        attempts.saturating_sub(failures)
    }

    /// Liveness: the process can respond at all. Always true while the
    /// checker exists; an HTTP timeout is what signals a dead process.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        true
    }

    /// Computes the full rollup: per-component state and an overall
    /// verdict where the worst component wins.
    #[must_use]
    pub fn check(&self) -> HealthReport {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut components = Vec::new();

        let store_status = if self.store_reachable.load(Ordering::Relaxed) {
            Status::Healthy
        } else {
            issues.push("store unreachable".to_string());
            recommendations.push("check the store backend's connectivity".to_string());
            Status::Down
        };
        components.push(ComponentHealth {
            name: "store",
            detail: if store_status == Status::Healthy {
                "reachable".to_string()
            } else {
                "unreachable".to_string()
            },
            status: store_status,
        });

        let depth = self.queue_depth.load(Ordering::Relaxed);
        let queue_status = if depth >= self.config.queue_depth_critical {
            issues.push(format!("queue depth {depth} at or above critical threshold"));
            recommendations.push("scale out dispatcher workers or shed load".to_string());
            Status::Critical
        } else if depth >= self.config.queue_depth_warning {
            issues.push(format!("queue depth {depth} at or above warning threshold"));
            Status::Warning
        } else {
            Status::Healthy
        };
        components.push(ComponentHealth {
            name: "queue_depth",
            detail: depth.to_string(),
            status: queue_status,
        });

        let error_rate = self.error_rate_last_hour();
        let error_status = if error_rate >= self.config.error_rate_critical {
            issues.push(format!("error rate {error_rate:.2} at or above critical threshold"));
            recommendations
                .push("inspect transport failures before they exhaust retries".to_string());
            Status::Critical
        } else if error_rate >= self.config.error_rate_warning {
            issues.push(format!("error rate {error_rate:.2} at or above warning threshold"));
            Status::Warning
        } else {
            Status::Healthy
        };
        components.push(ComponentHealth {
            name: "error_rate",
            detail: format!("{error_rate:.4}"),
            status: error_status,
        });

        let last_success_age_ms =
            now_millis().saturating_sub(self.last_transport_success_ms.load(Ordering::Relaxed));
        let transport_status = if last_success_age_ms >= self.config.transport_stale_critical_ms {
            issues.push("transport has not succeeded recently".to_string());
            recommendations
                .push("verify the transport's credentials and connectivity".to_string());
            Status::Critical
        } else if last_success_age_ms >= self.config.transport_stale_warning_ms {
            issues.push("transport success is aging".to_string());
            Status::Warning
        } else {
            Status::Healthy
        };
        components.push(ComponentHealth {
            name: "transport",
            detail: format!("{last_success_age_ms}ms since last success"),
            status: transport_status,
        });

        let overall = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(Status::Healthy);

        HealthReport {
            overall,
            components,
            issues,
            recommendations,
        }
    }
}
