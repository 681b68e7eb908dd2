//! The Retry Engine: pure policy, no I/O.
//!
//! `attempt_count` is incremented by [`smsrelay_store::Store::claim_next`]
//! at claim time, before the Transport is ever invoked (see `DESIGN.md`
//! for why). So by the time [`RetryEngine::decide`] runs,
//! `message.attempt_count` already reflects the attempt that just failed.

use rand::Rng;
use smsrelay_common::{Message, RetryStrategy};

use crate::types::RetryConfig;

/// Error-text substrings classified retryable, matched case-insensitively
/// against the transport's error message.
const RETRYABLE_CLASSES: &[&str] = &["timeout", "refused", "unavailable", "rate limit", "temporary"];

/// Error-text substrings classified non-retryable.
const NON_RETRYABLE_CLASSES: &[&str] = &["invalid", "authentication", "blocked", "suspended"];

/// The outcome of [`RetryEngine::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// No further attempt is permitted; the message becomes `FAILED`.
    Terminal,
    /// The message should become `SCHEDULED` with `scheduled_at` set to
    /// this absolute millisecond timestamp.
    RetryAt(u64),
}

/// Whether `error` matches a known retryable or non-retryable class.
/// Unknown errors default to retryable.
#[must_use]
pub fn is_retryable(error: &str) -> bool {
    let lower = error.to_ascii_lowercase();
    if NON_RETRYABLE_CLASSES.iter().any(|c| lower.contains(c)) {
        return false;
    }
    if RETRYABLE_CLASSES.iter().any(|c| lower.contains(c)) {
        return true;
    }
    true
}

/// Pure policy engine: classifies failures and computes the next-attempt
/// delay. Holds only configuration, no Store handle — every I/O-bearing
/// consequence of a decision is applied by the caller (Dispatcher or
/// Maintenance).
#[derive(Debug, Clone)]
pub struct RetryEngine {
    config: RetryConfig,
}

impl RetryEngine {
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Computes the delay, in milliseconds, before attempt number
    /// `next_attempt` (1-based) under `strategy`, given the message's
    /// retry policy. Exponential delays get ±`jitter_factor` uniform
    /// jitter unless the engine's config disables it.
    #[must_use]
    pub fn delay_ms(&self, next_attempt: u32, message: &Message) -> u64 {
        let policy = &message.retry_policy;
        let base = policy.base_delay_ms;
        let max = policy.max_delay_ms;

        let raw = match policy.strategy {
            RetryStrategy::Exponential => {
                let exponent = next_attempt.saturating_sub(1).min(32);
                let scaled = base.saturating_mul(1u64 << exponent);
                let bounded = scaled.min(max);
                self.apply_jitter(bounded)
            }
            RetryStrategy::Linear => base.saturating_mul(u64::from(next_attempt)).min(max),
            RetryStrategy::Fixed => base,
            RetryStrategy::Custom => policy
                .custom_delays_ms
                .get(next_attempt.saturating_sub(1) as usize)
                .copied()
                .unwrap_or(base)
                .min(max),
        };

        raw.min(max)
    }

    fn apply_jitter(&self, base: u64) -> u64 {
        if !self.config.jitter_enabled || self.config.jitter_factor <= 0.0 {
            return base;
        }
        let factor = self.config.jitter_factor.clamp(0.0, 1.0);
        let span = (base as f64 * factor) as i64;
        if span == 0 {
            return base;
        }
        let delta = rand::rng().random_range(-span..=span);
        (base as i64 + delta).max(0) as u64
    }

    /// `Decide(message, error) -> {Terminal | RetryAt(ts)}`.
    ///
    /// Does not mutate `message`; the caller applies the decision via
    /// `Store::update_state`/`update_terminal` using `message.attempt_count`
    /// (already incremented) and `now`.
    #[must_use]
    pub fn decide(&self, message: &Message, error: &str, now: u64) -> RetryDecision {
        if !is_retryable(error) {
            return RetryDecision::Terminal;
        }
        if message.attempt_count >= message.max_attempts {
            return RetryDecision::Terminal;
        }
        let delay = self.delay_ms(message.attempt_count, message);
        RetryDecision::RetryAt(now + delay)
    }
}
