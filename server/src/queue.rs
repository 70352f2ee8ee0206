//! Bounded priority queue for task dispatch
//!
//! Entries are ordered by priority (lower runs earlier) and, within a
//! priority band, by submission sequence number. Admission is non-blocking:
//! a full queue is an error at push time, never backpressure. Dequeueing
//! suspends the caller until an entry arrives or the queue is closed.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

/// A scheduled unit in the priority queue.
///
/// Ordering is `priority ASC, seq ASC`; `seq` is unique per process so the
/// `task_id` never participates in comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueEntry {
    pub priority: u8,
    pub seq: u64,
    pub task_id: Uuid,
}

/// Error returned when the queue is at capacity.
#[derive(Debug, thiserror::Error)]
#[error("queue is at capacity")]
pub struct QueueFull;

/// Bounded, concurrency-safe min-queue of `(priority, seq, task_id)` triples.
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<Reverse<QueueEntry>>>,
    // Counts queued entries so `pop` can suspend without busy-waiting.
    items: Semaphore,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::with_capacity(capacity)),
            items: Semaphore::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    /// Non-blocking enqueue. Fails with `QueueFull` once `capacity` entries
    /// are pending.
    pub async fn try_push(&self, entry: QueueEntry) -> Result<(), QueueFull> {
        {
            let mut heap = self.heap.lock().await;
            if heap.len() >= self.capacity {
                return Err(QueueFull);
            }
            heap.push(Reverse(entry));
        }
        self.items.add_permits(1);
        Ok(())
    }

    /// Removes and returns the lowest-priority-number entry, suspending while
    /// the queue is empty. Returns None once the queue has been closed.
    pub async fn pop(&self) -> Option<QueueEntry> {
        let permit = match self.items.acquire().await {
            Ok(permit) => permit,
            Err(_) => return None,
        };
        // The permit corresponds to exactly one queued entry.
        permit.forget();
        let mut heap = self.heap.lock().await;
        heap.pop().map(|Reverse(entry)| entry)
    }

    /// Closes the queue; every current and future `pop` returns None.
    pub fn close(&self) {
        self.items.close();
    }
}
