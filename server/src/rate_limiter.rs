//! Per-client sliding-window rate limiting
//!
//! Tracks request timestamps per key and enforces a cap on how many requests
//! fall inside the sliding window. Timestamps append at the tail of each
//! bucket and expire from the head; a background sweeper periodically prunes
//! stale timestamps and drops empty buckets so one-off clients do not leak
//! memory.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

pub struct RateLimiter {
    /// Maximum number of requests allowed within the window
    max_requests: usize,
    /// Length of the sliding window
    period: Duration,
    /// Cadence of the background bucket sweeper
    cleanup_interval: Duration,
    /// Map of client key to request timestamps, oldest first
    buckets: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    /// Handle to the sweeper while it is running
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, period_seconds: f64, cleanup_interval_seconds: f64) -> Self {
        Self {
            max_requests,
            period: Duration::from_secs_f64(period_seconds),
            cleanup_interval: Duration::from_secs_f64(cleanup_interval_seconds.max(0.01)),
            buckets: Arc::new(Mutex::new(HashMap::new())),
            cleanup_task: Mutex::new(None),
        }
    }

    /// Records a request for `key` if it fits in the window.
    ///
    /// Returns false, without recording anything, once `max_requests`
    /// timestamps already sit inside the window.
    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(key.to_string()).or_default();
        Self::prune(bucket, now, self.period);
        if bucket.len() >= self.max_requests {
            return false;
        }
        bucket.push_back(now);
        true
    }

    /// Number of requests `key` may still make within the current window.
    pub async fn remaining(&self, key: &str) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        match buckets.get_mut(key) {
            Some(bucket) => {
                Self::prune(bucket, now, self.period);
                self.max_requests.saturating_sub(bucket.len())
            }
            None => self.max_requests,
        }
    }

    /// Clears one bucket, or every bucket when no key is given.
    pub async fn reset(&self, key: Option<&str>) {
        let mut buckets = self.buckets.lock().await;
        match key {
            Some(key) => {
                buckets.remove(key);
            }
            None => buckets.clear(),
        }
    }

    /// Starts the background bucket sweeper. Calling it again while the
    /// sweeper is running is a no-op.
    pub async fn start_cleanup(&self) {
        let mut slot = self.cleanup_task.lock().await;
        if slot.is_some() {
            return;
        }
        info!("Starting rate limiter cleanup task");

        let buckets = Arc::clone(&self.buckets);
        let period = self.period;
        let cleanup_interval = self.cleanup_interval;
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            // The first tick of a tokio interval fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let now = Instant::now();
                let mut buckets = buckets.lock().await;
                let before = buckets.len();
                buckets.retain(|_, bucket| {
                    Self::prune(bucket, now, period);
                    !bucket.is_empty()
                });
                let removed = before - buckets.len();
                if removed > 0 {
                    debug!(
                        removed_buckets = removed,
                        remaining_buckets = buckets.len(),
                        "Pruned stale rate limiter buckets"
                    );
                }
            }
        }));
    }

    /// Stops the background sweeper if it is running.
    pub async fn stop_cleanup(&self) {
        let mut slot = self.cleanup_task.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Number of client keys currently tracked.
    pub async fn tracked_key_count(&self) -> usize {
        self.buckets.lock().await.len()
    }

    fn prune(bucket: &mut VecDeque<Instant>, now: Instant, period: Duration) {
        while let Some(&head) = bucket.front() {
            if now.duration_since(head) > period {
                bucket.pop_front();
            } else {
                break;
            }
        }
    }
}
