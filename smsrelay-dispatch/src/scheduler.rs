//! The Scheduler: single-ticker promotion loop. Does not itself send.

use std::sync::Arc;

use smsrelay_common::{Category, MessageId, MessageState, log_event, now_millis};
use smsrelay_store::{Store, Transition};
use smsrelay_telemetry::{
    EventBus,
    events::{Component, Event, EventHeader},
};
use tokio::sync::broadcast;

use crate::{error::Result, types::SchedulerConfig};

/// Counts produced by one [`Scheduler::tick`], also carried on the
/// `queue.promoted` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub promoted: usize,
    pub expired: usize,
}

/// Promotes due `SCHEDULED` rows to `QUEUED`, and fails rows whose
/// `scheduled_at` has aged past the expiration window instead of
/// promoting them.
#[derive(Debug)]
pub struct Scheduler<S: ?Sized> {
    store: Arc<S>,
    events: Arc<EventBus>,
    config: SchedulerConfig,
}

impl<S: Store + ?Sized> Scheduler<S> {
    #[must_use]
    pub const fn new(store: Arc<S>, events: Arc<EventBus>, config: SchedulerConfig) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    /// Runs the promotion loop every `scheduler_interval_ms` until `shutdown`
    /// fires, matching the rest of the ambient stack's `select!`-raced
    /// long-lived loop shape.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<smsrelay_common::Signal>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(
            self.config.scheduler_interval_ms,
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        log_event!(Category::Scheduler, tracing::Level::WARN, "scheduler tick failed"; error = %err);
                    }
                }
                _ = shutdown.recv() => {
                    log_event!(Category::Scheduler, tracing::Level::INFO, "scheduler shutting down");
                    return;
                }
            }
        }
    }

    /// One promotion pass: `due := ListScheduledDue(now)`, promote or
    /// expire each, then emit a single `queue.promoted` event with
    /// batch counts.
    ///
    /// # Errors
    /// Propagates any [`crate::error::DispatchError`].
    pub async fn tick(&self) -> Result<TickOutcome> {
        let now = now_millis();
        let due = self.store.list_scheduled_due(now).await?;

        let mut outcome = TickOutcome::default();
        for message in due {
            if self.is_expired(message.scheduled_at, now) {
                self.expire(message.id).await?;
                outcome.expired += 1;
            } else if self.promote(message.id, message.priority).await? {
                outcome.promoted += 1;
            }
        }

        if outcome.promoted > 0 || outcome.expired > 0 {
            self.events.publish(Event::QueuePromoted {
                header: EventHeader {
                    id: self.events.next_id(),
                    timestamp: now,
                    source: Component::Scheduler,
                },
                promoted: outcome.promoted,
                retried: 0,
                expired: outcome.expired,
            });
        }

        Ok(outcome)
    }

    /// Force-promote a single `SCHEDULED` message, bypassing the
    /// expiration check. Shared with the control surface's "retry now"
    /// operation so both paths go through one promotion routine.
    ///
    /// # Errors
    /// Propagates any [`crate::error::DispatchError`].
    pub async fn promote_now(&self, id: MessageId) -> Result<bool> {
        let message = self.store.get(id).await?;
        if message.state != MessageState::Scheduled {
            return Ok(false);
        }
        self.promote(id, message.priority).await
    }

    fn is_expired(&self, scheduled_at: Option<u64>, now: u64) -> bool {
        scheduled_at.is_some_and(|at| now.saturating_sub(at) > self.config.expiration_window_ms)
    }

    async fn promote(&self, id: MessageId, priority: smsrelay_common::Priority) -> Result<bool> {
        let position = self.store.max_queue_position(priority).await? + 1;
        Ok(self
            .store
            .update_state(
                id,
                MessageState::Scheduled,
                Transition::Queue {
                    queue_position: position,
                    priority: None,
                },
            )
            .await?)
    }

    async fn expire(&self, id: MessageId) -> Result<()> {
        self.store
            .update_terminal(
                id,
                MessageState::Failed,
                now_millis(),
                Some("expired-before-promotion".to_string()),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use smsrelay_common::{Message, Priority, RetryPolicy};
    use smsrelay_store::MemoryStore;

    use super::*;

    fn scheduled_message(scheduled_at: u64) -> Message {
        let mut message = Message::new(
            "+48123456789",
            "hello".into(),
            Priority::Normal,
            Some(scheduled_at),
            RetryPolicy::default(),
            HashMap::new(),
        )
        .unwrap();
        message.scheduled_at = Some(scheduled_at);
        message
    }

    fn scheduler(store: Arc<MemoryStore>) -> Scheduler<MemoryStore> {
        Scheduler::new(store, Arc::new(EventBus::new(64)), SchedulerConfig::default())
    }

    #[tokio::test]
    async fn promotes_due_scheduled_rows_to_queued() {
        let store = Arc::new(MemoryStore::new());
        let id = store.insert(scheduled_message(now_millis())).await.unwrap();

        let outcome = scheduler(store.clone()).tick().await.unwrap();
        assert_eq!(outcome.promoted, 1);
        assert_eq!(outcome.expired, 0);
        assert_eq!(store.get(id).await.unwrap().state, MessageState::Queued);
    }

    #[tokio::test]
    async fn expires_rows_past_the_expiration_window() {
        let store = Arc::new(MemoryStore::new());
        let stale = now_millis().saturating_sub(SchedulerConfig::default().expiration_window_ms + 1);
        let id = store.insert(scheduled_message(stale)).await.unwrap();

        let outcome = scheduler(store.clone()).tick().await.unwrap();
        assert_eq!(outcome.expired, 1);
        assert_eq!(outcome.promoted, 0);
        let message = store.get(id).await.unwrap();
        assert_eq!(message.state, MessageState::Failed);
        assert_eq!(message.error.as_deref(), Some("expired-before-promotion"));
    }

    #[tokio::test]
    async fn does_not_touch_rows_not_yet_due() {
        let store = Arc::new(MemoryStore::new());
        let future = now_millis() + 60_000;
        let id = store.insert(scheduled_message(future)).await.unwrap();

        let outcome = scheduler(store.clone()).tick().await.unwrap();
        assert_eq!(outcome.promoted, 0);
        assert_eq!(store.get(id).await.unwrap().state, MessageState::Scheduled);
    }

    #[tokio::test]
    async fn promote_now_bypasses_expiration_check() {
        let store = Arc::new(MemoryStore::new());
        let stale = now_millis().saturating_sub(SchedulerConfig::default().expiration_window_ms + 1);
        let id = store.insert(scheduled_message(stale)).await.unwrap();

        let promoted = scheduler(store.clone()).promote_now(id).await.unwrap();
        assert!(promoted);
        assert_eq!(store.get(id).await.unwrap().state, MessageState::Queued);
    }
}
