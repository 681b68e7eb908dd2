//! In-process publish/subscribe event bus.
//!
//! Each subscriber gets a bounded mailbox with a drop-oldest overflow
//! policy and in-order delivery per publisher/subscriber pair.
//! `tokio::sync::mpsc` enforces backpressure instead of dropping, so
//! subscribers here get a small hand-rolled ring buffer guarded by a
//! `parking_lot::Mutex` plus a `Notify` for wakeups, rather than a
//! channel type that would block `publish` under load.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::{sync::Notify, task::JoinHandle};

use crate::events::{Event, EventKind};

struct Mailbox {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, event: Event) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Waits for the next event, or returns `None` once the mailbox has
    /// been closed and drained.
    async fn pop(&self) -> Option<Event> {
        loop {
            if let Some(event) = self.queue.lock().pop_front() {
                return Some(event);
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.notify.notified().await;
        }
    }
}

struct Subscriber {
    mailbox: Arc<Mailbox>,
    filter: Option<EventKind>,
    task: JoinHandle<()>,
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it does not stop
/// delivery; call [`Self::unsubscribe`] to stop the background task and
/// release the mailbox.
pub struct SubscriptionHandle {
    id: u64,
    bus: Arc<EventBusInner>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {
        self.bus.remove(self.id);
    }
}

struct EventBusInner {
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_subscriber_id: AtomicU64,
    next_event_id: AtomicU64,
    mailbox_capacity: usize,
}

impl EventBusInner {
    fn remove(&self, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(pos) = subscribers.iter().position(|(sid, _)| *sid == id) {
            let (_, subscriber) = subscribers.remove(pos);
            subscriber.mailbox.close();
            subscriber.task.abort();
        }
    }
}

/// Bounded, fan-out publish/subscribe bus. One dedicated task per
/// subscriber drains its mailbox and invokes its handler, so a slow
/// handler only ever stalls its own subscription, never `publish`.
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

impl EventBus {
    #[must_use]
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                subscribers: Mutex::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(1),
                next_event_id: AtomicU64::new(1),
                mailbox_capacity,
            }),
        }
    }

    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.inner.next_event_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Delivers `event` to every subscriber whose filter matches. Never
    /// blocks: a subscriber at capacity drops its oldest queued event.
    pub fn publish(&self, event: Event) {
        let subscribers = self.inner.subscribers.lock();
        for (_, subscriber) in subscribers.iter() {
            if subscriber.filter.is_none_or(|kind| kind == event.kind()) {
                subscriber.mailbox.push(event.clone());
            }
        }
    }

    /// Registers `handler` to run once per matching event, in receive
    /// order for this subscriber. `type_filter` of `None` subscribes to
    /// every event kind.
    pub fn subscribe<F>(&self, type_filter: Option<EventKind>, handler: F) -> SubscriptionHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let mailbox = Arc::new(Mailbox::new(self.inner.mailbox_capacity));
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        let task_mailbox = mailbox.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = task_mailbox.pop().await {
                handler(event);
            }
        });

        self.inner.subscribers.lock().push((
            id,
            Subscriber {
                mailbox,
                filter: type_filter,
                task,
            },
        ));

        SubscriptionHandle {
            id,
            bus: self.inner.clone(),
        }
    }

    /// Total events dropped across all subscribers due to mailbox
    /// overflow, surfaced for the Health Monitor and `/health/detailed`.
    #[must_use]
    pub fn total_dropped(&self) -> u64 {
        self.inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, s)| s.mailbox.dropped.load(Ordering::Relaxed))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, atomic::AtomicUsize};

    use smsrelay_common::now_millis;

    use super::*;
    use crate::events::{Component, EventHeader};

    fn sent_event(bus: &EventBus) -> Event {
        Event::Sent {
            header: EventHeader {
                id: bus.next_id(),
                timestamp: now_millis(),
                source: Component::Dispatcher,
            },
            message_id: smsrelay_common::MessageId::generate(),
            processing_ms: 5,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_matching_events_in_order() {
        let bus = EventBus::new(16);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let _handle = bus.subscribe(Some(EventKind::Sent), move |event| {
            sink.lock().push(event.kind());
        });

        for _ in 0..3 {
            bus.publish(sent_event(&bus));
        }

        // Give the subscriber task a moment to drain.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(received.lock().len(), 3);
    }

    #[tokio::test]
    async fn filter_excludes_non_matching_kinds() {
        let bus = EventBus::new(16);
        let count = Arc::new(AtomicUsize::new(0));
        let sink = count.clone();
        let _handle = bus.subscribe(Some(EventKind::Failed), move |_| {
            sink.fetch_add(1, Ordering::Relaxed);
        });

        bus.publish(sent_event(&bus));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts_it() {
        let bus = EventBus::new(2);
        // No subscriber drains this one, so the mailbox itself fills up.
        let _handle = bus.subscribe(None, |_| {
            std::thread::sleep(std::time::Duration::from_millis(200));
        });

        for _ in 0..5 {
            bus.publish(sent_event(&bus));
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(bus.total_dropped() > 0);
    }
}
