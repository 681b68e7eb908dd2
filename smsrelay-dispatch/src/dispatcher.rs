//! The Dispatcher: the concurrency core of delivery.
//!
//! A bounded pool of workers each loop claim → send → resolve. Workers are
//! plain `tokio` tasks raced against a shutdown broadcast, matching the
//! long-lived-loop idiom used by the Scheduler and Maintenance.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use smsrelay_common::{Category, MessageState, Signal, log_event, now_millis};
use smsrelay_health::HealthChecker;
use smsrelay_store::{PriorityQueue, Store};
use smsrelay_telemetry::{
    EventBus, Metrics,
    events::{Component, Event, EventHeader},
};
use tokio::sync::broadcast;

use crate::{
    error::{DispatchError, Result},
    retry::{RetryDecision, RetryEngine},
    transport::Transport,
    types::DispatcherConfig,
};

/// Shared state a worker consults every loop iteration. Kept out of
/// [`Dispatcher`] itself so a worker task only needs to clone one `Arc`.
struct Shared<S: ?Sized, T: ?Sized> {
    queue: PriorityQueue<S>,
    transport: Arc<T>,
    retry: RetryEngine,
    events: Arc<EventBus>,
    metrics: Arc<Metrics>,
    health: Arc<HealthChecker>,
    config: DispatcherConfig,
    paused: AtomicBool,
}

/// Runs the bounded worker pool that claims, sends and resolves messages.
pub struct Dispatcher<S: ?Sized, T: ?Sized> {
    shared: Arc<Shared<S, T>>,
}

impl<S, T> Dispatcher<S, T>
where
    S: Store + ?Sized + 'static,
    T: Transport + ?Sized + 'static,
{
    #[must_use]
    pub fn new(
        queue: PriorityQueue<S>,
        transport: Arc<T>,
        retry: RetryEngine,
        events: Arc<EventBus>,
        metrics: Arc<Metrics>,
        health: Arc<HealthChecker>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue,
                transport,
                retry,
                events,
                metrics,
                health,
                config,
                paused: AtomicBool::new(false),
            }),
        }
    }

    /// Pause every worker: workers finish any in-flight send but stop
    /// claiming new messages until [`Self::resume`] is called.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Spawns `worker_count` worker tasks, each raced against `shutdown`,
    /// and waits for all of them to return.
    pub async fn run(&self, shutdown: broadcast::Receiver<Signal>) {
        let mut handles = Vec::with_capacity(self.shared.config.worker_count);
        for index in 0..self.shared.config.worker_count {
            let shared = self.shared.clone();
            let mut shutdown = shutdown.resubscribe();
            handles.push(tokio::spawn(async move {
                worker_loop(shared, index, &mut shutdown).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Whether worker `index` is allowed to claim a message right now, given
/// the health checker's current rollup.
fn capacity_allows(health: &HealthChecker, index: usize) -> bool {
    match health.check().overall {
        smsrelay_health::Status::Healthy | smsrelay_health::Status::Warning => true,
        smsrelay_health::Status::Critical => index % 4 == 0,
        smsrelay_health::Status::Down => false,
    }
}

async fn worker_loop<S, T>(
    shared: Arc<Shared<S, T>>,
    index: usize,
    shutdown: &mut broadcast::Receiver<Signal>,
) where
    S: Store + ?Sized,
    T: Transport + ?Sized,
{
    let mut idle_backoff_ms = shared.config.idle_poll_ms;

    loop {
        if shutdown.try_recv().is_ok() {
            return;
        }

        if shared.paused.load(Ordering::SeqCst) || !capacity_allows(&shared.health, index) {
            if sleep_or_shutdown(idle_backoff_ms, shutdown).await {
                return;
            }
            continue;
        }

        let claimed = tokio::select! {
            result = shared.queue.dequeue() => result,
            _ = shutdown.recv() => return,
        };

        let message = match claimed {
            Ok(Some(message)) => message,
            Ok(None) => {
                idle_backoff_ms = (idle_backoff_ms * 2).min(shared.config.idle_poll_max_ms);
                if sleep_or_shutdown(idle_backoff_ms, shutdown).await {
                    return;
                }
                continue;
            }
            Err(err) => {
                log_event!(Category::Dispatch, tracing::Level::WARN, "claim failed"; error = %err);
                if sleep_or_shutdown(idle_backoff_ms, shutdown).await {
                    return;
                }
                continue;
            }
        };

        idle_backoff_ms = shared.config.idle_poll_ms;
        if let Err(err) = handle_claimed(&shared, message, shutdown).await {
            log_event!(Category::Dispatch, tracing::Level::WARN, "dispatch attempt failed"; error = %err);
        }
    }
}

/// Sleeps for `millis`, returning early with `true` if `shutdown` fires
/// first (the caller should then return instead of continuing its loop).
async fn sleep_or_shutdown(millis: u64, shutdown: &mut broadcast::Receiver<Signal>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(std::time::Duration::from_millis(millis)) => false,
        _ = shutdown.recv() => true,
    }
}

async fn handle_claimed<S, T>(
    shared: &Arc<Shared<S, T>>,
    message: smsrelay_common::Message,
    shutdown: &mut broadcast::Receiver<Signal>,
) -> Result<()>
where
    S: Store + ?Sized,
    T: Transport + ?Sized,
{
    let started_at = now_millis();
    shared.events.publish(Event::SendingStarted {
        header: EventHeader {
            id: shared.events.next_id(),
            timestamp: started_at,
            source: Component::Dispatcher,
        },
        message_id: message.id,
    });

    let send = tokio::time::timeout(
        std::time::Duration::from_millis(shared.config.send_timeout_ms),
        shared.transport.send(&message.destination, &message.payload),
    );

    let outcome = tokio::select! {
        result = send => result,
        _ = shutdown.recv() => {
            // Cooperative cancellation: let the in-flight send finish but
            // ignore its result. The claimed row stays SENDING and
            // Maintenance rescues it after a restart.
            return Ok(());
        }
    };

    match outcome {
        Ok(Ok(())) => on_success(shared, &message, started_at).await,
        Ok(Err(transport_err)) => on_failure(shared, &message, transport_err.message, started_at).await,
        Err(_elapsed) => on_failure(shared, &message, "send timeout".to_string(), started_at).await,
    }
}

async fn on_success<S, T>(
    shared: &Arc<Shared<S, T>>,
    message: &smsrelay_common::Message,
    started_at: u64,
) -> Result<()>
where
    S: Store + ?Sized,
    T: Transport + ?Sized,
{
    let now = now_millis();
    shared
        .queue
        .store()
        .update_terminal(message.id, MessageState::Sent, now, None)
        .await
        .map_err(DispatchError::Store)?;

    shared.health.record_transport_success();
    let processing_ms = now.saturating_sub(started_at);
    shared.metrics.increment_counter("sms.sent", 1);
    shared.metrics.observe("dispatch.latency_ms", processing_ms);

    shared.events.publish(Event::Sent {
        header: EventHeader {
            id: shared.events.next_id(),
            timestamp: now,
            source: Component::Dispatcher,
        },
        message_id: message.id,
        processing_ms,
    });

    Ok(())
}

async fn on_failure<S, T>(
    shared: &Arc<Shared<S, T>>,
    message: &smsrelay_common::Message,
    error: String,
    _started_at: u64,
) -> Result<()>
where
    S: Store + ?Sized,
    T: Transport + ?Sized,
{
    let now = now_millis();
    shared.health.record_transport_failure();
    shared.metrics.increment_counter("sms.failed", 1);

    let decision = shared.retry.decide(message, &error, now);
    let will_retry = matches!(decision, RetryDecision::RetryAt(_));

    match decision {
        RetryDecision::Terminal => {
            shared
                .queue
                .store()
                .update_terminal(message.id, MessageState::Failed, now, Some(error.clone()))
                .await
                .map_err(DispatchError::Store)?;
        }
        RetryDecision::RetryAt(at) => {
            shared
                .queue
                .store()
                .update_state(
                    message.id,
                    MessageState::Sending,
                    smsrelay_store::Transition::Schedule {
                        scheduled_at: at,
                        attempt_count: message.attempt_count,
                        error: Some(error.clone()),
                    },
                )
                .await
                .map_err(DispatchError::Store)?;
        }
    }

    shared.events.publish(Event::Failed {
        header: EventHeader {
            id: shared.events.next_id(),
            timestamp: now,
            source: Component::Dispatcher,
        },
        message_id: message.id,
        error,
        will_retry,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use smsrelay_common::{Message, Priority, RetryPolicy};
    use smsrelay_health::HealthConfig;
    use smsrelay_store::MemoryStore;

    use super::*;
    use crate::{error::TransportError, transport::ScriptedTransport, types::RetryConfig};

    fn dispatcher(
        store: Arc<MemoryStore>,
        transport: Arc<ScriptedTransport>,
        worker_count: usize,
    ) -> Dispatcher<MemoryStore, ScriptedTransport> {
        Dispatcher::new(
            PriorityQueue::new(store),
            transport,
            RetryEngine::new(RetryConfig {
                jitter_enabled: false,
                ..RetryConfig::default()
            }),
            Arc::new(EventBus::new(64)),
            Arc::new(Metrics::new(None)),
            Arc::new(HealthChecker::new(HealthConfig::default())),
            DispatcherConfig {
                worker_count,
                send_timeout_ms: 5_000,
                idle_poll_ms: 5,
                idle_poll_max_ms: 20,
            },
        )
    }

    async fn queued_message(store: &MemoryStore) -> smsrelay_common::MessageId {
        let message = Message::new(
            "+48123456789",
            "hello".into(),
            Priority::Normal,
            None,
            RetryPolicy::default(),
            HashMap::new(),
        )
        .unwrap();
        store.insert(message).await.unwrap()
    }

    #[tokio::test]
    async fn successful_send_transitions_queued_to_sent() {
        let store = Arc::new(MemoryStore::new());
        let id = queued_message(&store).await;
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(())]));
        let dispatcher = dispatcher(store.clone(), transport, 1);

        let (tx, rx) = broadcast::channel(1);
        let run = tokio::spawn(async move { dispatcher.run(rx).await });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let _ = tx.send(Signal::Shutdown);
        let _ = run.await;

        assert_eq!(store.get(id).await.unwrap().state, MessageState::Sent);
    }

    #[tokio::test]
    async fn non_retryable_failure_is_terminal() {
        let store = Arc::new(MemoryStore::new());
        let id = queued_message(&store).await;
        let transport = Arc::new(ScriptedTransport::new(vec![Err(
            TransportError::new("invalid phone number"),
        )]));
        let dispatcher = dispatcher(store.clone(), transport, 1);

        let (tx, rx) = broadcast::channel(1);
        let run = tokio::spawn(async move { dispatcher.run(rx).await });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let _ = tx.send(Signal::Shutdown);
        let _ = run.await;

        let message = store.get(id).await.unwrap();
        assert_eq!(message.state, MessageState::Failed);
        assert_eq!(message.error.as_deref(), Some("invalid phone number"));
    }

    #[tokio::test]
    async fn paused_dispatcher_does_not_claim() {
        let store = Arc::new(MemoryStore::new());
        let id = queued_message(&store).await;
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(())]));
        let dispatcher = dispatcher(store.clone(), transport, 1);
        dispatcher.pause();

        let (tx, rx) = broadcast::channel(1);
        let run = tokio::spawn(async move { dispatcher.run(rx).await });

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        let _ = tx.send(Signal::Shutdown);
        let _ = run.await;

        assert_eq!(store.get(id).await.unwrap().state, MessageState::Queued);
    }
}
