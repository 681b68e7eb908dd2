//! The `Store` trait: the single source of truth every other component
//! reads from and writes to.
//!
//! Specified as an object-safe `async_trait` so the in-memory backend
//! shipped here and any durable backend added later (relational or
//! otherwise) satisfy the same contract.

use async_trait::async_trait;
use smsrelay_common::{Message, MessageId, MessageState, Priority};

use crate::error::Result;

/// The fields a conditional `update_state` call needs to apply, one
/// variant per legal conditional transition. Kept as a closed enum rather
/// than a bag of optional fields so a caller cannot request an
/// inconsistent combination (e.g. a `queue_position` on a transition into
/// `SCHEDULED`).
#[derive(Debug, Clone)]
pub enum Transition {
    /// `SCHEDULED \u{2192} QUEUED` (promotion) or a `QUEUED \u{2192} QUEUED`
    /// reprioritize: the only transition that sets `queue_position`.
    /// `priority` is `Some` only for a reprioritize, which also changes the
    /// priority band the new position was computed against.
    Queue {
        queue_position: i64,
        priority: Option<Priority>,
    },
    /// `QUEUED`/`SENDING` \u{2192} `SCHEDULED`: a retry backoff. Clears
    /// `queue_position`, sets `scheduled_at`, and records the attempt.
    Schedule {
        scheduled_at: u64,
        attempt_count: u32,
        error: Option<String>,
    },
    /// Any non-terminal state \u{2192} `CANCELLED`. Clears `queue_position`.
    Cancel,
}

/// Durable persistence and indexed retrieval of [`Message`]s.
///
/// Any failure surfaces as [`crate::error::StoreError::Fault`]; callers
/// must not interpret a Store fault as a message-level (transport) failure.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Assign an id and persist `message`. `message.state` must already be
    /// `QUEUED` or `SCHEDULED`.
    async fn insert(&self, message: Message) -> Result<MessageId>;

    /// Atomically assigns the next `queue_position` in `message.priority`'s
    /// band and inserts `message` as `QUEUED`, in one critical section.
    /// `max_queue_position` followed by `insert` cannot provide this on
    /// their own: a backend that takes separate locks for each step lets
    /// two concurrent callers targeting the same band compute the same
    /// position.
    async fn enqueue(&self, message: Message) -> Result<MessageId>;

    /// Fetch a message by id.
    async fn get(&self, id: MessageId) -> Result<Message>;

    /// Conditional transition: succeeds (returns `Ok(true)`) only if the
    /// record's current state equals `from`, otherwise returns `Ok(false)`
    /// without mutating anything (a concurrency conflict, never surfaced
    /// to the caller's caller — they retry against latest state).
    async fn update_state(
        &self,
        id: MessageId,
        from: MessageState,
        transition: Transition,
    ) -> Result<bool>;

    /// Unconditional terminal write (`SENT` or `FAILED`), used once the
    /// owning worker or Retry Engine has already exclusively claimed the
    /// record via `claim_next` and computed the final outcome.
    async fn update_terminal(
        &self,
        id: MessageId,
        state: MessageState,
        sent_at: u64,
        error: Option<String>,
    ) -> Result<()>;

    /// Atomically select one `QUEUED` message by the ordering rule
    /// (`priority DESC, queue_position ASC, created_at ASC, id ASC`) and
    /// transition it to `SENDING`, returning the claimed record. Exactly
    /// one caller among concurrent racers receives a given message.
    async fn claim_next(&self) -> Result<Option<Message>>;

    /// Indexed scan over one state.
    async fn list_by_state(
        &self,
        state: MessageState,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>>;

    /// All `SCHEDULED` rows whose `scheduled_at <= now`.
    async fn list_scheduled_due(&self, now: u64) -> Result<Vec<Message>>;

    /// All `SENDING` rows whose `sending_since <= cutoff`: candidates for
    /// Maintenance's rescue of abandoned in-flight sends.
    async fn list_sending_older_than(&self, cutoff: u64) -> Result<Vec<Message>>;

    async fn count_by_state(&self, state: MessageState) -> Result<usize>;

    /// Rewrite `queue_position` for all `QUEUED` rows to densely pack,
    /// preserving priority order. Returns the number of rows whose position
    /// actually changed (`0` on a repeated call: idempotent).
    async fn reorganize_positions(&self) -> Result<usize>;

    /// Delete terminal rows of `state` older than `cutoff` (milliseconds
    /// since epoch, compared against `sent_at`). Returns the count deleted.
    async fn delete_terminal_older_than(&self, state: MessageState, cutoff: u64) -> Result<usize>;

    /// Highest `queue_position` currently assigned within `priority`'s
    /// band, or the band's empty floor if none. Used by the priority queue
    /// to compute the next position on enqueue.
    async fn max_queue_position(&self, priority: Priority) -> Result<i64>;
}
