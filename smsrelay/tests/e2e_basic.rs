//! End-to-end test assembling the same components [`smsrelay::app::App`]
//! does, by hand, against an ephemeral port: build every component, bind
//! the control server to `127.0.0.1:0`, and drive it over HTTP.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use smsrelay_common::{MessageState, RetryPolicy};
use smsrelay_control::{AppState, ControlConfig, ControlServer};
use smsrelay_dispatch::{Dispatcher, DispatcherConfig, RetryConfig, RetryEngine, ScriptedTransport};
use smsrelay_health::{HealthChecker, HealthConfig};
use smsrelay_store::{MemoryStore, PriorityQueue};
use smsrelay_telemetry::{EventBus, Metrics};
use tokio::sync::broadcast;

struct Harness {
    base_url: String,
    shutdown_tx: broadcast::Sender<smsrelay_common::Signal>,
    control_task: tokio::task::JoinHandle<std::io::Result<()>>,
    dispatcher_task: tokio::task::JoinHandle<()>,
}

impl Harness {
    async fn start() -> Self {
        let store: Arc<dyn smsrelay_store::Store> = Arc::new(MemoryStore::new());
        let queue = PriorityQueue::new(store.clone());
        let events = Arc::new(EventBus::new(1_000));
        let metrics = Arc::new(Metrics::new(Some(events.clone())));
        let health = Arc::new(HealthChecker::new(HealthConfig::default()));

        let retry = RetryEngine::new(RetryConfig::default());
        let transport: Arc<dyn smsrelay_dispatch::Transport> =
            Arc::new(ScriptedTransport::new(vec![]));
        let dispatcher = Arc::new(Dispatcher::new(
            queue.clone(),
            transport,
            retry,
            events.clone(),
            metrics.clone(),
            health.clone(),
            DispatcherConfig {
                worker_count: 2,
                idle_poll_ms: 5,
                ..DispatcherConfig::default()
            },
        ));

        let scheduler = Arc::new(smsrelay_dispatch::Scheduler::new(
            store.clone(),
            events.clone(),
            smsrelay_dispatch::SchedulerConfig::default(),
        ));
        let maintenance = Arc::new(smsrelay_dispatch::Maintenance::new(
            store.clone(),
            events.clone(),
            RetryEngine::new(RetryConfig::default()),
            smsrelay_dispatch::MaintenanceConfig::default(),
        ));

        let state = AppState {
            store,
            queue: Arc::new(queue),
            scheduler,
            maintenance,
            dispatcher: dispatcher.clone(),
            metrics,
            health,
            config: ControlConfig {
                listen_address: "127.0.0.1:0".to_string(),
                high_watermark_queue: 10_000,
            },
            default_retry_policy: RetryPolicy::default(),
        };

        let server = ControlServer::new(state).await.expect("bind control server");
        let addr = server.local_addr().expect("local addr");

        let (shutdown_tx, _) = broadcast::channel(8);

        let control_shutdown = shutdown_tx.subscribe();
        let control_task = tokio::spawn(async move { server.serve(control_shutdown).await });

        let dispatcher_shutdown = shutdown_tx.subscribe();
        let dispatcher_task =
            tokio::spawn(async move { dispatcher.run(dispatcher_shutdown).await });

        Self {
            base_url: format!("http://{addr}"),
            shutdown_tx,
            control_task,
            dispatcher_task,
        }
    }

    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(smsrelay_common::Signal::Shutdown);
        let _ = self.control_task.await;
        let _ = self.dispatcher_task.await;
    }
}

/// S1: a message submitted with no `scheduled_at` is immediately QUEUED,
/// then the Dispatcher's worker pool claims and sends it, ending SENT.
#[tokio::test]
async fn submit_immediate_message_reaches_sent() {
    let harness = Harness::start().await;
    let client = reqwest::Client::new();

    let submit: serde_json::Value = client
        .post(format!("{}/sms", harness.base_url))
        .json(&json!({
            "recipient": "+15551234567",
            "content": "hello world",
        }))
        .send()
        .await
        .expect("submit request")
        .json()
        .await
        .expect("submit body");

    assert_eq!(submit["state"], "QUEUED");
    let id = submit["id"].as_str().expect("id").to_string();

    let mut final_state = None;
    for _ in 0..50 {
        let message: serde_json::Value = client
            .get(format!("{}/sms/{}", harness.base_url, id))
            .send()
            .await
            .expect("get request")
            .json()
            .await
            .expect("get body");
        let state = message["state"].as_str().unwrap_or_default().to_string();
        if state == "SENT" {
            final_state = Some(state);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(final_state.as_deref(), Some("SENT"));
    harness.shutdown().await;
}

/// A `SCHEDULED` message (not just a `QUEUED` one) can be cancelled, since
/// only terminal states reject cancellation.
#[tokio::test]
async fn cancel_scheduled_message_succeeds() {
    let harness = Harness::start().await;
    let client = reqwest::Client::new();

    // Far enough out that the Scheduler never promotes it during the test.
    let far_future = smsrelay_common::now_millis() + 60_000;
    let submit: serde_json::Value = client
        .post(format!("{}/sms", harness.base_url))
        .json(&json!({
            "recipient": "+15551234567",
            "content": "later",
            "scheduled_at": far_future,
        }))
        .send()
        .await
        .expect("submit request")
        .json()
        .await
        .expect("submit body");

    assert_eq!(submit["state"], "SCHEDULED");
    let id = submit["id"].as_str().expect("id").to_string();

    let cancel: serde_json::Value = client
        .delete(format!("{}/sms/{}", harness.base_url, id))
        .send()
        .await
        .expect("cancel request")
        .json()
        .await
        .expect("cancel body");
    assert_eq!(cancel["ok"], true);

    let message: serde_json::Value = client
        .get(format!("{}/sms/{}", harness.base_url, id))
        .send()
        .await
        .expect("get request")
        .json()
        .await
        .expect("get body");
    assert_eq!(message["state"], "CANCELLED");

    // Cancelling again is idempotent.
    let second_cancel = client
        .delete(format!("{}/sms/{}", harness.base_url, id))
        .send()
        .await
        .expect("second cancel request");
    assert_eq!(second_cancel.status(), reqwest::StatusCode::OK);

    harness.shutdown().await;
}
