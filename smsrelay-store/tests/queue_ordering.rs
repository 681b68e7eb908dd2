//! Cross-component behavior for the logical priority queue: the ordering
//! rule, cancellation idempotence and reprioritization, driven through
//! [`PriorityQueue`] rather than the backend directly.

use std::{collections::HashMap, sync::Arc};

use smsrelay_common::{Message, Priority, RetryPolicy};
use smsrelay_store::{MemoryStore, PriorityQueue};

fn new_message(priority: Priority) -> Message {
    Message::new(
        "+48123456789",
        "hello".into(),
        priority,
        None,
        RetryPolicy::default(),
        HashMap::new(),
    )
    .unwrap()
}

#[tokio::test]
async fn urgent_preempts_normal_regardless_of_submission_order() {
    let queue = PriorityQueue::new(Arc::new(MemoryStore::new()));

    let normal = new_message(Priority::Normal);
    let normal_id = normal.id;
    queue.enqueue(normal).await.unwrap();

    let urgent = new_message(Priority::Urgent);
    let urgent_id = urgent.id;
    queue.enqueue(urgent).await.unwrap();

    let first = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(first.id, urgent_id);

    let second = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(second.id, normal_id);
}

#[tokio::test]
async fn equal_priority_preserves_fifo_by_position() {
    let queue = PriorityQueue::new(Arc::new(MemoryStore::new()));

    let mut ids = Vec::new();
    for _ in 0..5 {
        let message = new_message(Priority::Normal);
        ids.push(message.id);
        queue.enqueue(message).await.unwrap();
    }

    for expected in ids {
        let claimed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(claimed.id, expected);
    }
}

#[tokio::test]
async fn cancelling_twice_is_idempotent() {
    let queue = PriorityQueue::new(Arc::new(MemoryStore::new()));
    let message = new_message(Priority::Low);
    let id = message.id;
    queue.enqueue(message).await.unwrap();

    assert!(queue.remove(id).await.unwrap());
    assert!(queue.remove(id).await.unwrap());
}

#[tokio::test]
async fn reprioritize_moves_message_ahead_in_claim_order() {
    let queue = PriorityQueue::new(Arc::new(MemoryStore::new()));

    let first = new_message(Priority::Normal);
    let first_id = first.id;
    queue.enqueue(first).await.unwrap();

    let second = new_message(Priority::Normal);
    let second_id = second.id;
    queue.enqueue(second).await.unwrap();

    assert!(queue.reprioritize(second_id, Priority::Urgent).await.unwrap());

    let claimed = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(claimed.id, second_id);
    let next = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(next.id, first_id);
}

#[tokio::test]
async fn clear_cancels_only_matching_priority() {
    let queue = PriorityQueue::new(Arc::new(MemoryStore::new()));
    queue.enqueue(new_message(Priority::Low)).await.unwrap();
    queue.enqueue(new_message(Priority::High)).await.unwrap();

    let cancelled = queue.clear(Some(Priority::Low)).await.unwrap();
    assert_eq!(cancelled, 1);
    assert_eq!(queue.size().await.unwrap(), 1);
}
