//! In-memory [`Store`] implementation.
//!
//! Primarily intended for testing and for running the pipeline without an
//! external database, but also serves as the reference shape a future
//! relational backend's indexes (`state`, `scheduled_at`, `(priority,
//! state)`, `queue_position`) would mirror.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use smsrelay_common::{Message, MessageId, MessageState, Priority, now_millis};

use crate::{
    error::{Result, StoreError},
    queue::band_floor,
    store::{Store, Transition},
};

/// `HashMap`-backed [`Store`], guarded by a single `RwLock`.
///
/// Write operations that must be exclusive (`claim_next`,
/// `update_state`) take the write guard for their whole critical section.
/// A single mutex covers the whole table here, since an in-memory
/// `HashMap` has no per-band locking to exploit.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    messages: Arc<RwLock<HashMap<MessageId, Message>>>,
    capacity: Option<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(HashMap::new())),
            capacity: None,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Arc::new(RwLock::new(HashMap::new())),
            capacity: Some(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Strict total order: `priority DESC, queue_position ASC, created_at
/// ASC`, ties broken by `id ASC`.
fn ordering_key(m: &Message) -> (std::cmp::Reverse<Priority>, Option<i64>, u64, MessageId) {
    (
        std::cmp::Reverse(m.priority),
        m.queue_position,
        m.created_at,
        m.id,
    )
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, message: Message) -> Result<MessageId> {
        if !matches!(message.state, MessageState::Queued | MessageState::Scheduled) {
            return Err(StoreError::Fault(format!(
                "insert requires QUEUED or SCHEDULED, got {}",
                message.state
            )));
        }

        let mut guard = self.messages.write();
        if let Some(cap) = self.capacity {
            if !guard.contains_key(&message.id) && guard.len() >= cap {
                return Err(StoreError::CapacityExceeded(guard.len(), cap));
            }
        }

        let id = message.id;
        guard.insert(id, message);
        Ok(id)
    }

    async fn enqueue(&self, mut message: Message) -> Result<MessageId> {
        let mut guard = self.messages.write();
        if let Some(cap) = self.capacity {
            if !guard.contains_key(&message.id) && guard.len() >= cap {
                return Err(StoreError::CapacityExceeded(guard.len(), cap));
            }
        }

        let position = guard
            .values()
            .filter(|m| m.state == MessageState::Queued && m.priority == message.priority)
            .filter_map(|m| m.queue_position)
            .max()
            .unwrap_or_else(|| band_floor(message.priority))
            + 1;

        message.state = MessageState::Queued;
        message.queue_position = Some(position);
        let id = message.id;
        guard.insert(id, message);
        Ok(id)
    }

    async fn get(&self, id: MessageId) -> Result<Message> {
        self.messages
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_state(
        &self,
        id: MessageId,
        from: MessageState,
        transition: Transition,
    ) -> Result<bool> {
        let mut guard = self.messages.write();
        let Some(message) = guard.get_mut(&id) else {
            return Err(StoreError::NotFound(id));
        };
        if message.state != from {
            return Ok(false);
        }

        match transition {
            Transition::Queue {
                queue_position,
                priority,
            } => {
                message.state = MessageState::Queued;
                message.queue_position = Some(queue_position);
                if let Some(priority) = priority {
                    message.priority = priority;
                }
            }
            Transition::Schedule {
                scheduled_at,
                attempt_count,
                error,
            } => {
                message.state = MessageState::Scheduled;
                message.queue_position = None;
                message.sending_since = None;
                message.scheduled_at = Some(scheduled_at);
                message.attempt_count = attempt_count;
                message.error = error;
            }
            Transition::Cancel => {
                message.state = MessageState::Cancelled;
                message.queue_position = None;
                message.sending_since = None;
            }
        }

        Ok(true)
    }

    async fn update_terminal(
        &self,
        id: MessageId,
        state: MessageState,
        sent_at: u64,
        error: Option<String>,
    ) -> Result<()> {
        if !state.is_terminal() {
            return Err(StoreError::Fault(format!(
                "update_terminal requires a terminal state, got {state}"
            )));
        }

        let mut guard = self.messages.write();
        let message = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        message.state = state;
        message.queue_position = None;
        message.sending_since = None;
        message.sent_at = Some(sent_at);
        message.error = error;
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<Message>> {
        let mut guard = self.messages.write();
        let next_id = guard
            .values()
            .filter(|m| m.state == MessageState::Queued)
            .min_by_key(|m| ordering_key(m))
            .map(|m| m.id);

        let Some(id) = next_id else {
            return Ok(None);
        };

        let message = guard.get_mut(&id).expect("id came from this map");
        message.state = MessageState::Sending;
        message.queue_position = None;
        message.sending_since = Some(now_millis());
        message.attempt_count += 1;
        Ok(Some(message.clone()))
    }

    async fn list_by_state(
        &self,
        state: MessageState,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let mut matching: Vec<Message> = self
            .messages
            .read()
            .values()
            .filter(|m| m.state == state)
            .cloned()
            .collect();
        matching.sort_by_key(|m| (m.created_at, m.id));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_scheduled_due(&self, now: u64) -> Result<Vec<Message>> {
        let mut due: Vec<Message> = self
            .messages
            .read()
            .values()
            .filter(|m| {
                m.state == MessageState::Scheduled
                    && m.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|m| (m.scheduled_at, m.id));
        Ok(due)
    }

    async fn list_sending_older_than(&self, cutoff: u64) -> Result<Vec<Message>> {
        let mut stale: Vec<Message> = self
            .messages
            .read()
            .values()
            .filter(|m| {
                m.state == MessageState::Sending
                    && m.sending_since.is_some_and(|since| since <= cutoff)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|m| (m.sending_since, m.id));
        Ok(stale)
    }

    async fn count_by_state(&self, state: MessageState) -> Result<usize> {
        Ok(self
            .messages
            .read()
            .values()
            .filter(|m| m.state == state)
            .count())
    }

    async fn reorganize_positions(&self) -> Result<usize> {
        let mut guard = self.messages.write();
        let mut queued: Vec<MessageId> = guard
            .values()
            .filter(|m| m.state == MessageState::Queued)
            .map(|m| m.id)
            .collect();
        queued.sort_by_key(|id| ordering_key(guard.get(id).expect("id from this map")));

        let mut changed = 0;
        let mut band_counters: HashMap<Priority, i64> = HashMap::new();
        for id in queued {
            let message = guard.get_mut(&id).expect("id from this map");
            let counter = band_counters.entry(message.priority).or_insert_with(|| band_floor(message.priority));
            *counter += 1;
            if message.queue_position != Some(*counter) {
                message.queue_position = Some(*counter);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_terminal_older_than(&self, state: MessageState, cutoff: u64) -> Result<usize> {
        if !state.is_terminal() {
            return Err(StoreError::Fault(format!(
                "delete_terminal_older_than requires a terminal state, got {state}"
            )));
        }

        let mut guard = self.messages.write();
        let to_delete: Vec<MessageId> = guard
            .values()
            .filter(|m| m.state == state && m.sent_at.is_some_and(|at| at < cutoff))
            .map(|m| m.id)
            .collect();
        let n = to_delete.len();
        for id in to_delete {
            guard.remove(&id);
        }
        Ok(n)
    }

    async fn max_queue_position(&self, priority: Priority) -> Result<i64> {
        Ok(self
            .messages
            .read()
            .values()
            .filter(|m| m.state == MessageState::Queued && m.priority == priority)
            .filter_map(|m| m.queue_position)
            .max()
            .unwrap_or_else(|| band_floor(priority)))
    }
}

/// Current wall-clock time helper re-exported for backends so callers
/// don't need to depend on `smsrelay_common` directly just to stamp a
/// terminal write.
#[must_use]
pub fn now() -> u64 {
    now_millis()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Map;

    use smsrelay_common::{Priority, RetryPolicy};

    use super::*;

    fn message(priority: Priority) -> Message {
        Message::new(
            "+48123456789",
            "hello".into(),
            priority,
            None,
            RetryPolicy::default(),
            Map::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn claim_next_respects_priority_then_position() {
        let store = MemoryStore::new();
        let low = message(Priority::Low);
        let urgent = message(Priority::Urgent);

        // Insert LOW first with an explicit low-band position, then URGENT
        // with a higher-band position, to prove priority wins over position.
        let mut low = low;
        low.queue_position = Some(band_floor(Priority::Low) + 1);
        let mut urgent = urgent;
        urgent.queue_position = Some(band_floor(Priority::Urgent) + 1);

        store.insert(low.clone()).await.unwrap();
        store.insert(urgent.clone()).await.unwrap();

        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, urgent.id);
        assert_eq!(claimed.state, MessageState::Sending);
        assert_eq!(claimed.attempt_count, 1);

        let claimed_next = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed_next.id, low.id);
    }

    #[tokio::test]
    async fn claim_next_is_exclusive_under_concurrency() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..20 {
            store.insert(message(Priority::Normal)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.claim_next().await.unwrap() }));
        }

        let mut claimed_ids = std::collections::HashSet::new();
        for handle in handles {
            let claimed = handle.await.unwrap().expect("every claim should succeed");
            assert!(claimed_ids.insert(claimed.id), "no id claimed twice");
        }
        assert_eq!(claimed_ids.len(), 20);
    }

    #[tokio::test]
    async fn enqueue_assigns_distinct_positions_under_concurrency() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.enqueue(message(Priority::Normal)).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let queued = store
            .list_by_state(MessageState::Queued, usize::MAX, 0)
            .await
            .unwrap();
        let positions: std::collections::HashSet<_> =
            queued.iter().filter_map(|m| m.queue_position).collect();
        assert_eq!(positions.len(), 20, "no two enqueues share a position");
    }

    #[tokio::test]
    async fn update_state_fails_on_stale_from() {
        let store = MemoryStore::new();
        let id = store.insert(message(Priority::Normal)).await.unwrap();
        store.claim_next().await.unwrap();

        let ok = store
            .update_state(
                id,
                MessageState::Queued,
                Transition::Cancel,
            )
            .await
            .unwrap();
        assert!(!ok, "message is SENDING, not QUEUED: conflict, not an error");
    }

    #[tokio::test]
    async fn reorganize_positions_is_idempotent() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            store.insert(message(Priority::Normal)).await.unwrap();
        }
        let first = store.reorganize_positions().await.unwrap();
        assert!(first > 0);
        let second = store.reorganize_positions().await.unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn delete_terminal_older_than_respects_cutoff() {
        let store = MemoryStore::new();
        let id = store.insert(message(Priority::Normal)).await.unwrap();
        store.claim_next().await.unwrap();
        store
            .update_terminal(id, MessageState::Sent, 1_000, None)
            .await
            .unwrap();

        assert_eq!(
            store
                .delete_terminal_older_than(MessageState::Sent, 500)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .delete_terminal_older_than(MessageState::Sent, 2_000)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn list_sending_older_than_finds_only_stale_claims() {
        let store = MemoryStore::new();
        let id = store.insert(message(Priority::Normal)).await.unwrap();
        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, id);

        assert!(store.list_sending_older_than(0).await.unwrap().is_empty());
        let stale = store
            .list_sending_older_than(claimed.sending_since.unwrap())
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, id);
    }

    #[tokio::test]
    async fn capacity_limit_rejects_new_inserts() {
        let store = MemoryStore::with_capacity(1);
        store.insert(message(Priority::Normal)).await.unwrap();
        let err = store.insert(message(Priority::Normal)).await.unwrap_err();
        assert!(matches!(err, StoreError::CapacityExceeded(1, 1)));
    }
}
