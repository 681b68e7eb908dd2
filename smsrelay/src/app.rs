//! The composition root: builds every component and runs them
//! concurrently until a shutdown signal arrives.
//!
//! The shutdown channel is owned locally by [`App::run`] rather than a
//! process-wide static, and every component is an explicitly constructed,
//! explicitly wired value rather than something reached through a global.

use std::sync::Arc;

use smsrelay_common::{MessageState, Signal};
use smsrelay_control::{AppState, ControlServer};
use smsrelay_dispatch::{Dispatcher, LoggingTransport, Maintenance, RetryEngine, Scheduler};
use smsrelay_health::{HealthChecker, HealthServer};
use smsrelay_store::{MemoryStore, PriorityQueue, Store};
use smsrelay_telemetry::{EventBus, Metrics};
use tokio::sync::broadcast;

use crate::config::SmsrelayConfig;

/// Everything the composition root built, ready to run.
pub struct App {
    config: SmsrelayConfig,
    store: Arc<dyn Store>,
    queue: PriorityQueue<dyn Store>,
    events: Arc<EventBus>,
    metrics: Arc<Metrics>,
    health: Arc<HealthChecker>,
    scheduler: Arc<Scheduler<dyn Store>>,
    maintenance: Arc<Maintenance<dyn Store>>,
    dispatcher: Arc<Dispatcher<dyn Store, dyn smsrelay_dispatch::Transport>>,
}

impl App {
    /// Wires up every component from `config`. Nothing here is started
    /// yet; call [`App::run`] to drive the pipeline.
    #[must_use]
    pub fn build(config: SmsrelayConfig) -> Self {
        let store: Arc<dyn Store> = match config.store.capacity {
            Some(capacity) => Arc::new(MemoryStore::with_capacity(capacity)),
            None => Arc::new(MemoryStore::new()),
        };
        let queue = PriorityQueue::new(store.clone());

        // The event bus always exists: the Scheduler, Dispatcher and
        // Maintenance all publish onto it unconditionally (see
        // `DESIGN.md`). `telemetry.enabled` instead gates whether a
        // consuming subscriber is attached below.
        let events = Arc::new(EventBus::new(config.telemetry.mailbox_capacity));
        let metrics = Arc::new(Metrics::new(Some(events.clone())));
        for (name, thresholds) in &config.telemetry.thresholds {
            metrics.set_threshold(name.clone(), *thresholds);
        }
        if config.telemetry.enabled {
            events.subscribe(None, |event| {
                tracing::debug!(?event, "telemetry event");
            });
        }

        let health = Arc::new(HealthChecker::new(config.health.clone()));

        let retry = RetryEngine::new(config.retry.clone());

        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            events.clone(),
            config.scheduler.clone(),
        ));
        let maintenance = Arc::new(Maintenance::new(
            store.clone(),
            events.clone(),
            retry.clone(),
            config.maintenance.clone(),
        ));

        let transport: Arc<dyn smsrelay_dispatch::Transport> = Arc::new(LoggingTransport::new());
        let dispatcher = Arc::new(Dispatcher::new(
            queue.clone(),
            transport,
            retry,
            events.clone(),
            metrics.clone(),
            health.clone(),
            config.dispatcher.clone(),
        ));

        Self {
            config,
            store,
            queue,
            events,
            metrics,
            health,
            scheduler,
            maintenance,
            dispatcher,
        }
    }

    /// Runs every long-lived loop (Scheduler, Maintenance, Dispatcher,
    /// Control Surface, Health Server) concurrently until a termination
    /// signal arrives, then waits for them all to wind down.
    ///
    /// # Errors
    /// Propagates a bind failure from either HTTP server.
    pub async fn run(self) -> anyhow::Result<()> {
        let (shutdown_tx, _) = broadcast::channel(64);

        let state = AppState {
            store: self.store.clone(),
            queue: Arc::new(self.queue.clone()),
            scheduler: self.scheduler.clone(),
            maintenance: self.maintenance.clone(),
            dispatcher: self.dispatcher.clone(),
            metrics: self.metrics.clone(),
            health: self.health.clone(),
            config: self.config.control.clone(),
            default_retry_policy: smsrelay_common::RetryPolicy {
                max_attempts: self.config.retry.max_attempts_default,
                strategy: self.config.retry.strategy_default,
                base_delay_ms: self.config.retry.base_delay_ms,
                max_delay_ms: self.config.retry.max_delay_ms,
                ..smsrelay_common::RetryPolicy::default()
            },
        };

        let control_server = ControlServer::new(state).await?;
        let health_server = if self.config.health.enabled {
            Some(HealthServer::new(self.config.health.clone(), self.health.clone()).await?)
        } else {
            None
        };

        tracing::info!("smsrelay starting");

        let scheduler = self.scheduler.clone();
        let scheduler_shutdown = shutdown_tx.subscribe();
        let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

        let maintenance = self.maintenance.clone();
        let maintenance_shutdown = shutdown_tx.subscribe();
        let maintenance_task =
            tokio::spawn(async move { maintenance.run(maintenance_shutdown).await });

        let dispatcher = self.dispatcher.clone();
        let dispatcher_shutdown = shutdown_tx.subscribe();
        let dispatcher_task =
            tokio::spawn(async move { dispatcher.run(dispatcher_shutdown).await });

        let probe_store = self.store.clone();
        let probe_health = self.health.clone();
        let probe_interval_ms = self.config.health.probe_interval_ms;
        let probe_shutdown = shutdown_tx.subscribe();
        let probe_task = tokio::spawn(async move {
            run_health_probe(probe_store, probe_health, probe_interval_ms, probe_shutdown).await;
        });

        let control_task = {
            let shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move { control_server.serve(shutdown).await })
        };
        let health_task = health_server.map(|server| {
            let shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move { server.serve(shutdown).await })
        });

        wait_for_shutdown_signal().await;
        tracing::info!("smsrelay shutting down");
        let _ = shutdown_tx.send(Signal::Shutdown);

        let _ = scheduler_task.await;
        let _ = maintenance_task.await;
        let _ = dispatcher_task.await;
        let _ = probe_task.await;
        control_task.await??;
        if let Some(task) = health_task {
            task.await??;
        }

        tracing::info!("smsrelay stopped");
        Ok(())
    }
}

/// Waits for either Ctrl+C or, on unix, `SIGTERM`.
/// Keeps the Health Monitor's `queue_depth`/`store_reachable` inputs
/// live: the checker itself has no way to read the Store on its own, so
/// the composition root polls it on an interval and pushes the results
/// in, matching the rest of the ambient stack's `select!`-raced
/// long-lived loop shape.
async fn run_health_probe(
    store: Arc<dyn Store>,
    health: Arc<HealthChecker>,
    interval_ms: u64,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match store.count_by_state(MessageState::Queued).await {
                    Ok(depth) => {
                        health.set_store_reachable(true);
                        health.set_queue_depth(depth as u64);
                    }
                    Err(_) => health.set_store_reachable(false),
                }
            }
            _ = shutdown.recv() => {
                return;
            }
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(signal) => signal,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
