//! Cross-component behavior for the event bus and metrics registry: a
//! published event reaching a filtered subscriber, and a metrics update
//! crossing a threshold emitting an alert onto the bus.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use smsrelay_common::{MessageId, now_millis};
use smsrelay_telemetry::{
    Component, Event, EventBus, EventHeader, EventKind, Metrics, Thresholds,
};

fn failed_event(bus: &EventBus) -> Event {
    Event::Failed {
        header: EventHeader {
            id: bus.next_id(),
            timestamp: now_millis(),
            source: Component::Dispatcher,
        },
        message_id: MessageId::generate(),
        error: "timeout".to_string(),
        will_retry: true,
    }
}

#[tokio::test]
async fn subscriber_only_sees_its_filtered_kind() {
    let bus = EventBus::new(32);
    let failed_count = Arc::new(AtomicUsize::new(0));
    let sent_count = Arc::new(AtomicUsize::new(0));

    let failed_sink = failed_count.clone();
    let _failed_sub = bus.subscribe(Some(EventKind::Failed), move |_| {
        failed_sink.fetch_add(1, Ordering::Relaxed);
    });
    let sent_sink = sent_count.clone();
    let _sent_sub = bus.subscribe(Some(EventKind::Sent), move |_| {
        sent_sink.fetch_add(1, Ordering::Relaxed);
    });

    for _ in 0..4 {
        bus.publish(failed_event(&bus));
    }

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(failed_count.load(Ordering::Relaxed), 4);
    assert_eq!(sent_count.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn metric_crossing_threshold_emits_alert_event() {
    let bus = Arc::new(EventBus::new(32));
    let metrics = Metrics::new(Some(bus.clone()));
    metrics.set_threshold(
        "queue.depth",
        Thresholds {
            info: Some(10.0),
            warn: Some(50.0),
            critical: Some(100.0),
        },
    );

    let alerts = Arc::new(AtomicUsize::new(0));
    let sink = alerts.clone();
    let _sub = bus.subscribe(Some(EventKind::Alert), move |event| {
        if let Event::Alert { level, value, .. } = event {
            assert_eq!(value, 150.0);
            let _ = level;
            sink.fetch_add(1, Ordering::Relaxed);
        }
    });

    metrics.set_gauge("queue.depth", 150.0);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(alerts.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn metric_below_every_threshold_emits_nothing() {
    let bus = Arc::new(EventBus::new(32));
    let metrics = Metrics::new(Some(bus.clone()));
    metrics.set_threshold(
        "queue.depth",
        Thresholds {
            info: Some(10.0),
            warn: Some(50.0),
            critical: Some(100.0),
        },
    );

    let alerts = Arc::new(AtomicUsize::new(0));
    let sink = alerts.clone();
    let _sub = bus.subscribe(Some(EventKind::Alert), move |_| {
        sink.fetch_add(1, Ordering::Relaxed);
    });

    metrics.set_gauge("queue.depth", 3.0);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(alerts.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn counter_and_histogram_survive_concurrent_updates() {
    let metrics = Arc::new(Metrics::new(None));
    let mut handles = Vec::new();
    for _ in 0..10 {
        let metrics = metrics.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                metrics.increment_counter("sms.sent", 1);
                metrics.observe("dispatch.latency", 42);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(metrics.counter_value("sms.sent"), 1_000);
    let snapshot = metrics.histogram_snapshot("dispatch.latency").unwrap();
    assert_eq!(snapshot.count, 1_000);
}
