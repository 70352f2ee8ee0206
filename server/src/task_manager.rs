//! In-memory task table, worker pool, and lifecycle management
//!
//! The task manager admits, orders, executes, observes, cancels, and
//! garbage-collects tasks. Submissions land in a table of records and a
//! bounded priority queue; a fixed pool of workers drains the queue and runs
//! the registered job executors; a sweeper removes terminal records once
//! they outlive the configured grace period.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use shared::api::{ProgressInfo, TaskInfo, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::jobs::{self, JobOutcome};
use crate::queue::{QueueEntry, TaskQueue};

/// Maximum time to wait for workers and the sweeper during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Internal record wrapping the public task projection.
pub struct TaskRecord {
    pub info: TaskInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancel_requested: bool,
    pub started_monotonic: Option<Instant>,
    pub est_total_seconds: Option<u64>,
    // Change notifier for long-poll observers. Waiters re-arm by taking a
    // fresh receiver before awaiting; producers fire-and-forget.
    changed: watch::Sender<()>,
}

impl TaskRecord {
    pub(crate) fn new(info: TaskInfo, now: DateTime<Utc>) -> Self {
        let (changed, _) = watch::channel(());
        Self {
            info,
            created_at: now,
            updated_at: now,
            cancel_requested: false,
            started_monotonic: None,
            est_total_seconds: None,
            changed,
        }
    }

    /// Wakes every observer currently waiting on this record.
    pub fn notify_change(&self) {
        self.changed.send_replace(());
    }

    fn subscribe(&self) -> watch::Receiver<()> {
        self.changed.subscribe()
    }
}

/// Task table plus the submission sequence counter, guarded by one mutex.
pub(crate) struct TaskTable {
    pub(crate) tasks: HashMap<Uuid, TaskRecord>,
    pub(crate) seq: u64,
}

/// Errors surfaced by `submit`.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Task queue is full (max {0})")]
    QueueFull(usize),
}

/// Errors surfaced by `cancel`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CancelError {
    #[error("Task not found")]
    NotFound,
    #[error("Task {task_id} is already {status}")]
    NotCancellable { task_id: Uuid, status: TaskStatus },
}

struct ManagerHandles {
    workers: Vec<JoinHandle<()>>,
    cleanup: Option<JoinHandle<()>>,
}

/// Owns the task table, priority queue, worker pool, and cleanup loop.
pub struct TaskManager {
    table: Arc<Mutex<TaskTable>>,
    queue: Arc<TaskQueue>,
    concurrency: usize,
    cleanup_after_seconds: u64,
    cleanup_sleep_seconds: f64,
    handles: Mutex<ManagerHandles>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TaskManager {
    pub fn new(
        max_queue_size: usize,
        concurrency: usize,
        cleanup_after_seconds: u64,
        cleanup_sleep_seconds: f64,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            table: Arc::new(Mutex::new(TaskTable {
                tasks: HashMap::new(),
                seq: 0,
            })),
            queue: Arc::new(TaskQueue::new(max_queue_size)),
            concurrency,
            cleanup_after_seconds,
            cleanup_sleep_seconds,
            handles: Mutex::new(ManagerHandles {
                workers: Vec::new(),
                cleanup: None,
            }),
            shutdown_tx,
        }
    }

    /// Spawns the worker pool and the cleanup sweeper.
    pub async fn start(&self) {
        info!("Starting {} workers", self.concurrency);
        let mut handles = self.handles.lock().await;
        for worker_index in 0..self.concurrency {
            let table = Arc::clone(&self.table);
            let queue = Arc::clone(&self.queue);
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles
                .workers
                .push(tokio::spawn(worker_loop(worker_index, table, queue, shutdown_rx)));
        }

        let table = Arc::clone(&self.table);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let cleanup_after_seconds = self.cleanup_after_seconds;
        let cleanup_sleep_seconds = self.cleanup_sleep_seconds;
        handles.cleanup = Some(tokio::spawn(cleanup_loop(
            table,
            cleanup_after_seconds,
            cleanup_sleep_seconds,
            shutdown_rx,
        )));
    }

    /// Stops the workers and the sweeper, waiting for each to finish.
    ///
    /// In-flight executors observe the shutdown signal within one progress
    /// tick and their records transition to `cancelled`.
    pub async fn stop(&self) {
        self.queue.close();
        let _ = self.shutdown_tx.send(());

        let mut handles = self.handles.lock().await;
        for (worker_index, handle) in handles.workers.drain(..).enumerate() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Worker {} panicked during shutdown: {}", worker_index, e),
                Err(_) => warn!("Worker {} shutdown timeout reached", worker_index),
            }
        }
        if let Some(handle) = handles.cleanup.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Cleanup task panicked during shutdown: {}", e),
                Err(_) => warn!("Cleanup task shutdown timeout reached"),
            }
        }
        info!("Task manager stopped");
    }

    /// Admits a task: records it as `queued` and enqueues it for dispatch.
    ///
    /// The enqueue is non-blocking; if the queue is at capacity the record is
    /// removed again and the submission fails with `QueueFull`.
    pub async fn submit(
        &self,
        task_type: &str,
        parameters: Map<String, Value>,
        priority: u8,
    ) -> Result<TaskInfo, SubmitError> {
        let task_id = Uuid::new_v4();
        let now = Utc::now();
        let info = TaskInfo {
            task_id,
            status: TaskStatus::Queued,
            task_type: task_type.to_string(),
            parameters,
            result: None,
            error: None,
            progress: 0,
            progress_info: Some(ProgressInfo::message("Queued")),
        };

        let seq = {
            let mut table = self.table.lock().await;
            table.tasks.insert(task_id, TaskRecord::new(info.clone(), now));
            table.seq += 1;
            table.seq
        };

        if self
            .queue
            .try_push(QueueEntry {
                priority,
                seq,
                task_id,
            })
            .await
            .is_err()
        {
            let mut table = self.table.lock().await;
            table.tasks.remove(&task_id);
            return Err(SubmitError::QueueFull(self.queue.capacity()));
        }

        Ok(info)
    }

    /// Returns a snapshot of the task, or None if it does not exist.
    pub async fn get(&self, task_id: Uuid) -> Option<TaskInfo> {
        let table = self.table.lock().await;
        table.tasks.get(&task_id).map(|rec| rec.info.clone())
    }

    /// Returns a snapshot plus a change receiver, taken atomically so no
    /// transition between observing and waiting can be missed.
    pub async fn watch(&self, task_id: Uuid) -> Option<(TaskInfo, watch::Receiver<()>)> {
        let table = self.table.lock().await;
        table
            .tasks
            .get(&task_id)
            .map(|rec| (rec.info.clone(), rec.subscribe()))
    }

    /// Requests cancellation of a task.
    ///
    /// A queued task is cancelled immediately; a processing task has its
    /// flag set and the executor honours it at the next progress tick.
    /// Terminal tasks fail with `NotCancellable`.
    pub async fn cancel(&self, task_id: Uuid) -> Result<TaskInfo, CancelError> {
        let mut table = self.table.lock().await;
        let rec = table
            .tasks
            .get_mut(&task_id)
            .ok_or(CancelError::NotFound)?;

        if rec.info.status.is_terminal() {
            return Err(CancelError::NotCancellable {
                task_id,
                status: rec.info.status,
            });
        }

        rec.cancel_requested = true;
        rec.updated_at = Utc::now();

        if rec.info.status == TaskStatus::Queued {
            rec.info.status = TaskStatus::Cancelled;
            rec.info.error = Some("Cancelled before processing".to_string());
            rec.notify_change();
            return Ok(rec.info.clone());
        }

        // Processing: the worker observes the flag at its next checkpoint.
        rec.notify_change();
        Ok(rec.info.clone())
    }

    /// Returns task snapshots, optionally filtered by status, capped at
    /// `limit`.
    ///
    /// The table is snapshotted under the mutex and filtered afterwards, so
    /// the listed statuses are a point-in-time approximation. Order is the
    /// table's iteration order (unspecified).
    pub async fn list(&self, status_filter: Option<TaskStatus>, limit: usize) -> Vec<TaskInfo> {
        let snapshot: Vec<TaskInfo> = {
            let table = self.table.lock().await;
            table.tasks.values().map(|rec| rec.info.clone()).collect()
        };
        snapshot
            .into_iter()
            .filter(|info| status_filter.is_none_or(|status| info.status == status))
            .take(limit)
            .collect()
    }

    #[cfg(test)]
    pub(crate) async fn queued_len(&self) -> usize {
        self.queue.len().await
    }
}

/// Scoped handle a running executor uses to publish progress and observe
/// cancellation on its own record.
#[derive(Clone)]
pub struct JobContext {
    table: Arc<Mutex<TaskTable>>,
    task_id: Uuid,
}

impl JobContext {
    pub(crate) fn new(table: Arc<Mutex<TaskTable>>, task_id: Uuid) -> Self {
        Self { table, task_id }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Runs `f` on the record under the table lock. Returns None if the
    /// record no longer exists.
    pub async fn with_record<R>(&self, f: impl FnOnce(&mut TaskRecord) -> R) -> Option<R> {
        let mut table = self.table.lock().await;
        table.tasks.get_mut(&self.task_id).map(f)
    }
}

async fn worker_loop(
    worker_index: usize,
    table: Arc<Mutex<TaskTable>>,
    queue: Arc<TaskQueue>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("Worker {} started", worker_index);
    loop {
        let entry = tokio::select! {
            entry = queue.pop() => match entry {
                Some(entry) => entry,
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        };
        process_entry(&table, entry, &mut shutdown_rx).await;
    }
    info!("Worker {} stopped", worker_index);
}

/// Runs one dequeued entry through the full lifecycle: transition to
/// processing, execute, classify the outcome into a terminal state.
///
/// Entries whose record is gone (cancelled while queued, then swept) or
/// already cancelled are skipped. Every per-task failure is absorbed here;
/// the worker itself never dies on a task.
async fn process_entry(
    table: &Arc<Mutex<TaskTable>>,
    entry: QueueEntry,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    let task_id = entry.task_id;

    let job = {
        let mut guard = table.lock().await;
        let Some(rec) = guard.tasks.get_mut(&task_id) else {
            return;
        };
        if rec.info.status == TaskStatus::Cancelled {
            return;
        }

        let now = Utc::now();
        rec.info.status = TaskStatus::Processing;
        rec.started_monotonic = Some(Instant::now());
        rec.updated_at = now;
        rec.info.progress = 0;
        rec.info.progress_info = Some(ProgressInfo {
            message: "Processing...".to_string(),
            started_at: Some(now),
            eta_seconds: None,
        });
        rec.notify_change();
        (rec.info.task_type.clone(), rec.info.parameters.clone())
    };
    let (task_type, parameters) = job;

    let ctx = JobContext::new(Arc::clone(table), task_id);
    let outcome = tokio::select! {
        outcome = jobs::execute(&ctx, &task_type, parameters) => outcome,
        // Manager shutdown: terminate the invocation and record cancellation.
        _ = shutdown_rx.recv() => JobOutcome::Cancelled,
    };

    let mut guard = table.lock().await;
    let Some(rec) = guard.tasks.get_mut(&task_id) else {
        return;
    };
    match outcome {
        JobOutcome::Completed(value) => {
            rec.info.status = TaskStatus::Completed;
            rec.info.result = Some(value);
            rec.info.progress = 100;
            let started_at = rec.info.progress_info.as_ref().and_then(|p| p.started_at);
            rec.info.progress_info = Some(ProgressInfo {
                message: "Done".to_string(),
                started_at,
                eta_seconds: Some(0),
            });
        }
        JobOutcome::Cancelled => {
            rec.info.status = TaskStatus::Cancelled;
            if rec.info.error.is_none() {
                rec.info.error = Some("Cancelled during processing".to_string());
            }
        }
        JobOutcome::Failed(reason) => {
            rec.info.status = TaskStatus::Failed;
            rec.info.error = Some(reason);
        }
        JobOutcome::Unexpected(detail) => {
            error!(task_id = %task_id, detail = %detail, "Unexpected error processing task");
            rec.info.status = TaskStatus::Failed;
            rec.info.error = Some(format!("Unexpected error: {detail}"));
        }
    }
    rec.updated_at = Utc::now();
    rec.notify_change();
}

async fn cleanup_loop(
    table: Arc<Mutex<TaskTable>>,
    cleanup_after_seconds: u64,
    cleanup_sleep_seconds: f64,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("Cleanup started");
    let mut interval = tokio::time::interval(Duration::from_secs_f64(
        cleanup_sleep_seconds.max(0.01),
    ));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                let removed = {
                    let mut guard = table.lock().await;
                    let expired: Vec<Uuid> = guard
                        .tasks
                        .iter()
                        .filter(|(_, rec)| {
                            rec.info.status.is_terminal()
                                && (now - rec.updated_at).num_seconds()
                                    >= cleanup_after_seconds as i64
                        })
                        .map(|(task_id, _)| *task_id)
                        .collect();
                    for task_id in &expired {
                        guard.tasks.remove(task_id);
                    }
                    expired.len()
                };
                if removed > 0 {
                    info!("Cleaned up {} tasks", removed);
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}
