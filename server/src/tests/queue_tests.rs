//! Tests for the bounded priority queue

use crate::queue::{QueueEntry, TaskQueue};
use std::sync::Arc;
use tokio::time::Duration;
use uuid::Uuid;

fn entry(priority: u8, seq: u64) -> QueueEntry {
    QueueEntry {
        priority,
        seq,
        task_id: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn test_lower_priority_dequeues_first() {
    let queue = TaskQueue::new(10);
    let mid = entry(5, 1);
    let high = entry(0, 2);
    let low = entry(10, 3);
    queue.try_push(mid).await.unwrap();
    queue.try_push(high).await.unwrap();
    queue.try_push(low).await.unwrap();

    assert_eq!(queue.pop().await.unwrap().task_id, high.task_id);
    assert_eq!(queue.pop().await.unwrap().task_id, mid.task_id);
    assert_eq!(queue.pop().await.unwrap().task_id, low.task_id);
}

#[tokio::test]
async fn test_fifo_within_same_priority() {
    let queue = TaskQueue::new(10);
    let first = entry(3, 1);
    let second = entry(3, 2);
    let third = entry(3, 3);
    // Push out of submission order; seq decides.
    queue.try_push(third).await.unwrap();
    queue.try_push(first).await.unwrap();
    queue.try_push(second).await.unwrap();

    assert_eq!(queue.pop().await.unwrap().seq, 1);
    assert_eq!(queue.pop().await.unwrap().seq, 2);
    assert_eq!(queue.pop().await.unwrap().seq, 3);
}

#[tokio::test]
async fn test_capacity_is_a_hard_cap() {
    let queue = TaskQueue::new(2);
    queue.try_push(entry(0, 1)).await.unwrap();
    queue.try_push(entry(0, 2)).await.unwrap();
    assert!(queue.try_push(entry(0, 3)).await.is_err());
    assert_eq!(queue.len().await, 2);

    // Popping frees a slot again.
    queue.pop().await.unwrap();
    assert!(queue.try_push(entry(0, 4)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_pop_suspends_until_push() {
    let queue = Arc::new(TaskQueue::new(4));
    let popper = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.pop().await })
    };

    // Let the popper park on the empty queue first.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!popper.is_finished());

    let pushed = entry(1, 7);
    queue.try_push(pushed).await.unwrap();
    let popped = popper.await.unwrap().unwrap();
    assert_eq!(popped.task_id, pushed.task_id);
}

#[tokio::test(start_paused = true)]
async fn test_close_wakes_pending_pop() {
    let queue = Arc::new(TaskQueue::new(4));
    let popper = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.pop().await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.close();
    assert_eq!(popper.await.unwrap(), None);

    // Once closed, pop never blocks again.
    assert_eq!(queue.pop().await, None);
}
