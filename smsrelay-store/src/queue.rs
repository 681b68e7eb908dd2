//! The logical priority queue: a view over `QUEUED` rows with a stable
//! total order. Not a separate physical structure — every operation here
//! translates directly to a [`Store`] call.

use std::sync::Arc;

use smsrelay_common::{Message, MessageId, MessageState, Priority};

use crate::{
    error::Result,
    store::{Store, Transition},
};

/// Per-priority-band position floor. `(5 - priority) * 10_000` guarantees
/// every position in a higher-priority band sorts below every position in
/// a lower-priority one, with headroom for tens of thousands of messages
/// per band before reorganization is needed.
#[must_use]
pub fn band_floor(priority: Priority) -> i64 {
    (5 - i64::from(priority.as_u8())) * 10_000
}

/// Logical operations over the `QUEUED` subset of the [`Store`].
///
/// `enqueue` and `claim_next` are the two operations that must serialize
/// against concurrent callers targeting the same priority band; both
/// delegate to a single atomic backend call rather than composing
/// `max_queue_position` with a separate write.
#[derive(Debug, Clone)]
pub struct PriorityQueue<S: ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> PriorityQueue<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Persist `message` as `QUEUED`, assigning it the next position in
    /// its priority band.
    ///
    /// # Errors
    /// Propagates any [`crate::error::StoreError`].
    pub async fn enqueue(&self, message: Message) -> Result<MessageId> {
        self.store.enqueue(message).await
    }

    /// Claim and return the next message by the ordering rule, or `None`
    /// if the queue is empty. Exactly-once under concurrent callers.
    ///
    /// # Errors
    /// Propagates any [`crate::error::StoreError`].
    pub async fn dequeue(&self) -> Result<Option<Message>> {
        self.store.claim_next().await
    }

    /// Cancel a `QUEUED` or `SCHEDULED` message. Idempotent: cancelling an
    /// already-`CANCELLED` message returns `Ok(true)` without side effect.
    ///
    /// # Errors
    /// Propagates any [`crate::error::StoreError`] other than a benign
    /// conflict against a state this method doesn't retry from.
    pub async fn remove(&self, id: MessageId) -> Result<bool> {
        for from in [MessageState::Queued, MessageState::Scheduled] {
            if self
                .store
                .update_state(id, from, Transition::Cancel)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(self.store.get(id).await?.state == MessageState::Cancelled)
    }

    /// Move a `QUEUED` message into a new priority band, recomputing its
    /// position. Returns `Ok(false)` if the message is not currently
    /// `QUEUED` (a 409 at the control surface).
    ///
    /// # Errors
    /// Propagates any [`crate::error::StoreError`].
    pub async fn reprioritize(&self, id: MessageId, new_priority: Priority) -> Result<bool> {
        let position = self.store.max_queue_position(new_priority).await? + 1;
        self.store
            .update_state(
                id,
                MessageState::Queued,
                Transition::Queue {
                    queue_position: position,
                    priority: Some(new_priority),
                },
            )
            .await
    }

    /// Bulk-cancel every `QUEUED` message, optionally restricted to one
    /// priority band. Returns the number cancelled.
    ///
    /// # Errors
    /// Propagates any [`crate::error::StoreError`].
    pub async fn clear(&self, priority: Option<Priority>) -> Result<usize> {
        let queued = self.store.list_by_state(MessageState::Queued, usize::MAX, 0).await?;
        let mut cancelled = 0;
        for message in queued {
            if priority.is_some_and(|p| p != message.priority) {
                continue;
            }
            if self
                .store
                .update_state(message.id, MessageState::Queued, Transition::Cancel)
                .await?
            {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    /// Number of `QUEUED` messages.
    ///
    /// # Errors
    /// Propagates any [`crate::error::StoreError`].
    pub async fn size(&self) -> Result<usize> {
        self.store.count_by_state(MessageState::Queued).await
    }

    /// Number of `QUEUED` messages in one priority band.
    ///
    /// # Errors
    /// Propagates any [`crate::error::StoreError`].
    pub async fn size_by_priority(&self, priority: Priority) -> Result<usize> {
        Ok(self
            .store
            .list_by_state(MessageState::Queued, usize::MAX, 0)
            .await?
            .into_iter()
            .filter(|m| m.priority == priority)
            .count())
    }

    /// The longest-waiting `QUEUED` message under the ordering rule, if any.
    ///
    /// # Errors
    /// Propagates any [`crate::error::StoreError`].
    pub async fn oldest(&self) -> Result<Option<Message>> {
        let mut queued = self.store.list_by_state(MessageState::Queued, usize::MAX, 0).await?;
        queued.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.queue_position.cmp(&b.queue_position))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(queued.into_iter().next())
    }
}
