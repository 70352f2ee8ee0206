//! Default values for configuration parameters
//!
//! This module centralizes all default value functions used by the server
//! configuration when the corresponding environment variable is not set.

// Simulated work bounds advertised to clients

/// Default minimum simulated task time (5 seconds)
pub fn default_task_min_time() -> u64 {
    5
}

/// Default maximum simulated task time (30 seconds)
pub fn default_task_max_time() -> u64 {
    30
}

// Rate limiting defaults

/// Default maximum requests per window per client
pub fn default_max_requests_per_ip() -> usize {
    10
}

/// Default rate limit window (60 seconds)
pub fn default_rate_limit_period() -> f64 {
    60.0
}

/// Default cadence of the rate limiter bucket sweeper (300 seconds)
pub fn default_rate_limit_cleanup_interval() -> f64 {
    300.0
}

// Task manager defaults

/// Default number of concurrent workers
pub fn default_concurrency() -> usize {
    5
}

/// Default hard cap on queued tasks
pub fn default_max_tasks_queue() -> usize {
    100
}

/// Default age after which terminal records are removed (600 seconds)
pub fn default_cleanup_after_seconds() -> u64 {
    600
}

/// Default cadence of the terminal-record sweeper (0.5 seconds)
pub fn default_cleanup_sleep_seconds() -> f64 {
    0.5
}

// HTTP defaults

/// Default listen address for the HTTP server
pub fn default_listen_address() -> String {
    "0.0.0.0:8000".to_string()
}

/// Default long-poll timeout when the client enables wait (10 seconds)
pub fn default_long_poll_timeout_seconds() -> u64 {
    10
}

/// Default number of tasks returned by the list endpoint
pub fn default_list_limit() -> usize {
    10
}
