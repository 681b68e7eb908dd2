//! Counters, gauges and histograms, with threshold-driven alerting.
//!
//! `Metrics` is an owned, injectable registry rather than a process-global
//! singleton: the composition root builds one `Arc<Metrics>` and hands
//! clones to whichever components need to record something.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use serde::Deserialize;
use smsrelay_common::now_millis;

use crate::{
    bus::EventBus,
    events::{Component, Event, EventHeader},
};

/// Severity of a crossed threshold, ordered so the highest one crossed
/// wins when more than one is configured for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Info,
    Warn,
    Critical,
}

/// Optional alert thresholds for a single named metric. `None` fields are
/// simply never checked.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Thresholds {
    pub info: Option<f64>,
    pub warn: Option<f64>,
    pub critical: Option<f64>,
}

impl Thresholds {
    fn highest_crossed(&self, value: f64) -> Option<AlertLevel> {
        if self.critical.is_some_and(|t| value >= t) {
            Some(AlertLevel::Critical)
        } else if self.warn.is_some_and(|t| value >= t) {
            Some(AlertLevel::Warn)
        } else if self.info.is_some_and(|t| value >= t) {
            Some(AlertLevel::Info)
        } else {
            None
        }
    }
}

/// Upper bounds, in milliseconds, of the fixed histogram buckets. The
/// final implicit bucket (`10k+`) catches everything above the last
/// boundary.
pub const BUCKET_BOUNDS_MS: [u64; 9] = [5, 10, 25, 50, 100, 500, 1_000, 5_000, 10_000];

#[derive(Debug)]
struct HistogramState {
    buckets: [AtomicU64; BUCKET_BOUNDS_MS.len() + 1],
    count: AtomicU64,
    sum_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl Default for HistogramState {
    fn default() -> Self {
        Self {
            buckets: Default::default(),
            count: AtomicU64::new(0),
            sum_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
        }
    }
}

impl HistogramState {
    fn observe(&self, value_ms: u64) {
        let bucket = BUCKET_BOUNDS_MS
            .iter()
            .position(|&bound| value_ms <= bound)
            .unwrap_or(BUCKET_BOUNDS_MS.len());
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(value_ms, Ordering::Relaxed);
        self.min_ms.fetch_min(value_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(value_ms, Ordering::Relaxed);
    }

    /// Estimate the value at percentile `p` (0.0-100.0) as the upper
    /// bound of the bucket that contains that rank. This is the usual
    /// bucketed-histogram approximation: precise to the bucket, not the
    /// sample.
    fn percentile(&self, p: f64) -> Option<u64> {
        let total = self.count.load(Ordering::Relaxed);
        if total == 0 {
            return None;
        }
        let target = ((p / 100.0) * total as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= target.max(1) {
                return Some(BUCKET_BOUNDS_MS.get(i).copied().unwrap_or(u64::MAX));
            }
        }
        Some(u64::MAX)
    }
}

/// A point-in-time read of a histogram/timer metric.
#[derive(Debug, Clone, Copy)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: Option<u64>,
    pub p90_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

/// Owned metric registry: counters, gauges and histograms keyed by name,
/// plus optional per-name [`Thresholds`] that emit an [`Event::Alert`] on
/// the bus when crossed.
pub struct Metrics {
    counters: DashMap<String, Arc<AtomicU64>>,
    gauges: DashMap<String, Arc<AtomicU64>>,
    histograms: DashMap<String, Arc<HistogramState>>,
    thresholds: DashMap<String, Thresholds>,
    events: Option<Arc<EventBus>>,
}

impl Metrics {
    #[must_use]
    pub fn new(events: Option<Arc<EventBus>>) -> Self {
        Self {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
            thresholds: DashMap::new(),
            events,
        }
    }

    pub fn set_threshold(&self, metric: impl Into<String>, thresholds: Thresholds) {
        self.thresholds.insert(metric.into(), thresholds);
    }

    pub fn increment_counter(&self, name: &str, delta: u64) {
        let counter = self
            .counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        let total = counter.fetch_add(delta, Ordering::Relaxed) + delta;
        self.check_threshold(name, total as f64);
    }

    #[must_use]
    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        let gauge = self
            .gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        gauge.store(value.to_bits(), Ordering::Relaxed);
        self.check_threshold(name, value);
    }

    #[must_use]
    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.gauges
            .get(name)
            .map(|g| f64::from_bits(g.load(Ordering::Relaxed)))
    }

    pub fn observe(&self, name: &str, value_ms: u64) {
        let histogram = self
            .histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(HistogramState::default()))
            .clone();
        histogram.observe(value_ms);
        self.check_threshold(name, value_ms as f64);
    }

    #[must_use]
    pub fn histogram_snapshot(&self, name: &str) -> Option<HistogramSnapshot> {
        let histogram = self.histograms.get(name)?;
        let count = histogram.count.load(Ordering::Relaxed);
        if count == 0 {
            return None;
        }
        Some(HistogramSnapshot {
            count,
            sum_ms: histogram.sum_ms.load(Ordering::Relaxed),
            min_ms: histogram.min_ms.load(Ordering::Relaxed),
            max_ms: histogram.max_ms.load(Ordering::Relaxed),
            p50_ms: histogram.percentile(50.0),
            p90_ms: histogram.percentile(90.0),
            p95_ms: histogram.percentile(95.0),
            p99_ms: histogram.percentile(99.0),
        })
    }

    fn check_threshold(&self, name: &str, value: f64) {
        let Some(thresholds) = self.thresholds.get(name) else {
            return;
        };
        let Some(level) = thresholds.highest_crossed(value) else {
            return;
        };
        drop(thresholds);
        if let Some(events) = &self.events {
            events.publish(Event::Alert {
                header: EventHeader {
                    id: events.next_id(),
                    timestamp: now_millis(),
                    source: Component::Metrics,
                },
                metric: name.to_string(),
                level,
                value,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let metrics = Metrics::new(None);
        metrics.increment_counter("sms.sent", 1);
        metrics.increment_counter("sms.sent", 2);
        assert_eq!(metrics.counter_value("sms.sent"), 3);
    }

    #[test]
    fn gauge_holds_latest_value() {
        let metrics = Metrics::new(None);
        metrics.set_gauge("queue.depth", 10.0);
        metrics.set_gauge("queue.depth", 4.0);
        assert_eq!(metrics.gauge_value("queue.depth"), Some(4.0));
    }

    #[test]
    fn histogram_tracks_count_and_bounds() {
        let metrics = Metrics::new(None);
        for value in [2, 8, 30, 2_000] {
            metrics.observe("dispatch.latency", value);
        }
        let snapshot = metrics.histogram_snapshot("dispatch.latency").unwrap();
        assert_eq!(snapshot.count, 4);
        assert_eq!(snapshot.min_ms, 2);
        assert_eq!(snapshot.max_ms, 2_000);
        assert!(snapshot.p99_ms.unwrap() >= snapshot.p50_ms.unwrap());
    }

    #[test]
    fn threshold_crossing_picks_highest_level() {
        let metrics = Metrics::new(None);
        metrics.set_threshold(
            "queue.depth",
            Thresholds {
                info: Some(10.0),
                warn: Some(50.0),
                critical: Some(100.0),
            },
        );
        // No bus attached, so this only exercises that checking a
        // threshold doesn't panic when nothing is subscribed.
        metrics.set_gauge("queue.depth", 150.0);
        assert_eq!(metrics.gauge_value("queue.depth"), Some(150.0));
    }
}
