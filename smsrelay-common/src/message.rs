//! The central entity of the delivery pipeline and its small value objects.
//!
//! [`Message`] is mutated only by the Scheduler, Dispatcher, Retry Engine,
//! Maintenance or an explicit Control Surface call (never directly by more
//! than one of those at once); every other component treats it as data
//! handed back from the Store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::now_millis;

/// Opaque, stable identifier assigned to a [`Message`] on persist.
///
/// Backed by a ULID so ids sort lexicographically by creation time, which
/// the ordering rule's `created_at ASC` / `id ASC` tiebreak relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(ulid::Ulid);

impl MessageId {
    /// Generate a new, time-ordered id.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for MessageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ulid::Ulid::from_string(&s)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Dispatch priority. Ordinal value is used directly by the ordering rule's
/// `priority DESC` term and by the queue-position band offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl Priority {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        })
    }
}

/// Lifecycle state. Transitions are the only legal mutation of
/// state-derived fields (`queue_position`, `sent_at`, `scheduled_at`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageState {
    Queued,
    Scheduled,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

impl MessageState {
    /// Terminal states admit no further transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for MessageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Queued => "QUEUED",
            Self::Scheduled => "SCHEDULED",
            Self::Sending => "SENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        })
    }
}

/// Retry delay strategy. See [`RetryPolicy`] for the parameters each one
/// consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetryStrategy {
    Exponential,
    Linear,
    Fixed,
    Custom,
}

/// Per-message (or per-class default) retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Only consulted when `strategy == Custom`: attempt number (1-based) to
    /// delay in milliseconds. Falls back to `base_delay_ms` if an attempt is
    /// not present in the table.
    #[serde(default)]
    pub custom_delays_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            custom_delays_ms: Vec::new(),
        }
    }
}

/// A submission rejected before it ever reaches the Store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("destination must be 9-15 digits (optional leading '+') after stripping punctuation, got {0:?}")]
    InvalidDestination(String),
    #[error("payload must not be empty")]
    EmptyPayload,
    #[error("scheduled_at ({scheduled_at}) must not precede created_at ({created_at})")]
    ScheduledBeforeCreated { created_at: u64, scheduled_at: u64 },
}

/// Code units above which a payload is accepted but flagged, matching the
/// single-segment SMS length a carrier will otherwise split transparently.
pub const PAYLOAD_WARN_LEN: usize = 160;

/// Strip formatting punctuation and check the remaining digits are
/// 9-15 long, with an optional leading `+`.
///
/// # Errors
/// Returns [`ValidationError::InvalidDestination`] if the address does not
/// match that shape.
pub fn validate_destination(raw: &str) -> Result<String, ValidationError> {
    let mut cleaned = String::with_capacity(raw.len());
    let mut chars = raw.trim().chars().peekable();

    if chars.peek() == Some(&'+') {
        cleaned.push('+');
        chars.next();
    }

    for c in chars {
        if c.is_ascii_digit() {
            cleaned.push(c);
        } else if matches!(c, '-' | ' ' | '(' | ')' | '.') {
            continue;
        } else {
            return Err(ValidationError::InvalidDestination(raw.to_string()));
        }
    }

    let digit_len = cleaned.trim_start_matches('+').len();
    if !(9..=15).contains(&digit_len) {
        return Err(ValidationError::InvalidDestination(raw.to_string()));
    }

    Ok(cleaned)
}

/// Returns `true` when `payload` exceeds [`PAYLOAD_WARN_LEN`] UTF-8 code
/// units. The caller should log a warning; the payload is never rejected
/// for length alone.
#[must_use]
pub fn payload_exceeds_single_segment(payload: &str) -> bool {
    payload.encode_utf16().count() > PAYLOAD_WARN_LEN
}

/// The central entity: a single SMS submission with its full lifecycle
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub destination: String,
    pub payload: String,
    pub state: MessageState,
    pub priority: Priority,
    pub created_at: u64,
    pub scheduled_at: Option<u64>,
    pub sent_at: Option<u64>,
    /// When this row was last claimed into `SENDING`. `None` outside that
    /// state; Maintenance reads it to identify abandoned sends.
    pub sending_since: Option<u64>,
    pub error: Option<String>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub retry_policy: RetryPolicy,
    pub queue_position: Option<i64>,
    pub metadata: HashMap<String, String>,
}

impl Message {
    /// Build a new message in `QUEUED` (no `scheduled_at`) or `SCHEDULED`
    /// state, validating the destination and (if present) `scheduled_at`
    /// monotonicity. Never produces an already-persisted record: the caller
    /// still owes it an id via the Store.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if the destination is malformed or
    /// `scheduled_at` precedes `created_at`.
    pub fn new(
        destination: &str,
        payload: String,
        priority: Priority,
        scheduled_at: Option<u64>,
        retry_policy: RetryPolicy,
        metadata: HashMap<String, String>,
    ) -> Result<Self, ValidationError> {
        if payload.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }

        let destination = validate_destination(destination)?;
        let created_at = now_millis();

        if let Some(scheduled_at) = scheduled_at {
            if scheduled_at < created_at {
                return Err(ValidationError::ScheduledBeforeCreated {
                    created_at,
                    scheduled_at,
                });
            }
        }

        let state = if scheduled_at.is_some() {
            MessageState::Scheduled
        } else {
            MessageState::Queued
        };

        Ok(Self {
            id: MessageId::generate(),
            destination,
            payload,
            state,
            priority,
            created_at,
            scheduled_at,
            sent_at: None,
            sending_since: None,
            error: None,
            attempt_count: 0,
            max_attempts: retry_policy.max_attempts,
            retry_policy,
            queue_position: None,
            metadata,
        })
    }
}
