//! Maintenance: periodic, single-flight compaction and rescue pass.

use std::sync::Arc;

use smsrelay_common::{Category, MessageState, log_event, now_millis};
use smsrelay_store::Store;
use smsrelay_telemetry::{
    EventBus,
    events::{Component, Event, EventHeader},
};
use tokio::sync::broadcast;

use crate::{
    error::Result,
    retry::{RetryDecision, RetryEngine},
    types::MaintenanceConfig,
};

/// Counts produced by one [`Maintenance::run_once`], also carried on the
/// `queue.maintenance` event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceOutcome {
    pub sent_deleted: usize,
    pub failed_deleted: usize,
    pub rescued: usize,
    pub expired: usize,
    pub recommendations: Vec<String>,
}

/// Runs the retention, rescue and compaction pass.
/// `CANCELLED` rows are never touched: retention here covers only `SENT`
/// and `FAILED` (see `DESIGN.md`).
#[derive(Debug)]
pub struct Maintenance<S: ?Sized> {
    store: Arc<S>,
    events: Arc<EventBus>,
    retry: RetryEngine,
    config: MaintenanceConfig,
}

impl<S: Store + ?Sized> Maintenance<S> {
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        events: Arc<EventBus>,
        retry: RetryEngine,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            store,
            events,
            retry,
            config,
        }
    }

    /// Runs the pass every `maintenance_interval_ms` until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<smsrelay_common::Signal>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(
            self.config.maintenance_interval_ms,
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.run_once().await {
                        log_event!(Category::Maintenance, tracing::Level::WARN, "maintenance pass failed"; error = %err);
                    }
                }
                _ = shutdown.recv() => {
                    log_event!(Category::Maintenance, tracing::Level::INFO, "maintenance shutting down");
                    return;
                }
            }
        }
    }

    /// Single-flight: callers are expected to serialize invocations (the
    /// composition root only ever drives one `run` loop per process), so
    /// this does not take an internal lock of its own.
    ///
    /// # Errors
    /// Propagates any [`crate::error::DispatchError`].
    pub async fn run_once(&self) -> Result<MaintenanceOutcome> {
        let now = now_millis();
        let mut outcome = MaintenanceOutcome::default();

        outcome.sent_deleted = self
            .store
            .delete_terminal_older_than(
                MessageState::Sent,
                now.saturating_sub(self.config.retention_sent_days * 24 * 60 * 60 * 1_000),
            )
            .await?;
        outcome.failed_deleted = self
            .store
            .delete_terminal_older_than(
                MessageState::Failed,
                now.saturating_sub(self.config.retention_failed_days * 24 * 60 * 60 * 1_000),
            )
            .await?;

        let stale_cutoff = now.saturating_sub(self.config.sending_rescue_after_ms);
        for message in self.store.list_sending_older_than(stale_cutoff).await? {
            match self.retry.decide(&message, "abandoned-sending", now) {
                RetryDecision::Terminal => {
                    self.store
                        .update_terminal(
                            message.id,
                            MessageState::Failed,
                            now,
                            Some("abandoned-sending".to_string()),
                        )
                        .await?;
                }
                RetryDecision::RetryAt(at) => {
                    self.store
                        .update_state(
                            message.id,
                            MessageState::Sending,
                            smsrelay_store::Transition::Schedule {
                                scheduled_at: at,
                                attempt_count: message.attempt_count,
                                error: Some("abandoned-sending".to_string()),
                            },
                        )
                        .await?;
                }
            }
            outcome.rescued += 1;
        }

        if outcome.sent_deleted > 0 || outcome.failed_deleted > 0 {
            self.store.reorganize_positions().await?;
        }

        let queue_depth = self.store.count_by_state(MessageState::Queued).await?;
        if queue_depth > 100 {
            outcome
                .recommendations
                .push("queue depth > 100: consider raising dispatcher worker_count".to_string());
        }
        let failed = self.store.count_by_state(MessageState::Failed).await?;
        let sent = self.store.count_by_state(MessageState::Sent).await?;
        let total = failed + sent;
        if total > 0 && (failed as f64 / total as f64) > 0.1 {
            outcome
                .recommendations
                .push("error rate > 10%: investigate the transport".to_string());
        }

        self.events.publish(Event::Maintenance {
            header: EventHeader {
                id: self.events.next_id(),
                timestamp: now,
                source: Component::Maintenance,
            },
            sent_deleted: outcome.sent_deleted,
            failed_deleted: outcome.failed_deleted,
            rescued: outcome.rescued,
            expired: outcome.expired,
            recommendations: outcome.recommendations.clone(),
        });

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use smsrelay_common::{Message, Priority, RetryPolicy};
    use smsrelay_store::MemoryStore;

    use super::*;
    use crate::types::RetryConfig;

    fn maintenance(store: Arc<MemoryStore>) -> Maintenance<MemoryStore> {
        Maintenance::new(
            store,
            Arc::new(EventBus::new(64)),
            RetryEngine::new(RetryConfig::default()),
            MaintenanceConfig::default(),
        )
    }

    async fn insert_sending(store: &MemoryStore) -> smsrelay_common::MessageId {
        let message = Message::new(
            "+48123456789",
            "hello".into(),
            Priority::Normal,
            None,
            RetryPolicy::default(),
            HashMap::new(),
        )
        .unwrap();
        let id = store.insert(message).await.unwrap();
        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        id
    }

    #[tokio::test]
    async fn rescues_abandoned_sending_rows() {
        let store = Arc::new(MemoryStore::new());
        let id = insert_sending(&store).await;

        // A zero rescue window makes every SENDING row immediately stale,
        // standing in for a row abandoned by a crashed worker.
        let mut config = MaintenanceConfig::default();
        config.sending_rescue_after_ms = 0;
        let m = Maintenance::new(
            store.clone(),
            Arc::new(EventBus::new(64)),
            RetryEngine::new(RetryConfig::default()),
            config,
        );

        let outcome = m.run_once().await.unwrap();
        assert_eq!(outcome.rescued, 1);
        let message = store.get(id).await.unwrap();
        assert!(matches!(
            message.state,
            MessageState::Scheduled | MessageState::Failed
        ));
    }

    #[tokio::test]
    async fn deletes_old_sent_and_failed_rows() {
        let store = Arc::new(MemoryStore::new());
        let sent_msg = Message::new(
            "+48123456789",
            "hello".into(),
            Priority::Normal,
            None,
            RetryPolicy::default(),
            HashMap::new(),
        )
        .unwrap();
        let id = store.insert(sent_msg).await.unwrap();
        store.claim_next().await.unwrap();
        store
            .update_terminal(id, MessageState::Sent, 0, None)
            .await
            .unwrap();

        let mut config = MaintenanceConfig::default();
        config.retention_sent_days = 0;
        let m = Maintenance::new(
            store.clone(),
            Arc::new(EventBus::new(64)),
            RetryEngine::new(RetryConfig::default()),
            config,
        );
        let outcome = m.run_once().await.unwrap();
        assert_eq!(outcome.sent_deleted, 1);
        assert!(store.get(id).await.is_err());
    }

    #[tokio::test]
    async fn recommends_raising_workers_when_queue_is_deep() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..101 {
            let message = Message::new(
                "+48123456789",
                "hello".into(),
                Priority::Normal,
                None,
                RetryPolicy::default(),
                HashMap::new(),
            )
            .unwrap();
            store.insert(message).await.unwrap();
        }

        let outcome = maintenance(store).run_once().await.unwrap();
        assert!(
            outcome
                .recommendations
                .iter()
                .any(|r| r.contains("worker_count"))
        );
    }
}
