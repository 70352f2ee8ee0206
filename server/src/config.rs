//! Server configuration loaded from the environment
//!
//! Every option has a default (see `shared::defaults`) and can be overridden
//! with an environment variable. Unparseable values are a startup error, not
//! a silent fallback.

use anyhow::{anyhow, Result};
use shared::defaults;
use std::fmt::Display;
use std::str::FromStr;

/// Runtime configuration for the task scheduling server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Advertised minimum simulated task time, in seconds
    pub task_min_time: u64,
    /// Advertised maximum simulated task time, in seconds
    pub task_max_time: u64,
    /// Maximum requests per window per client
    pub max_requests_per_time_per_ip: usize,
    /// Rate limit window length, in seconds
    pub rate_limit_period: f64,
    /// Cadence of the rate limiter bucket sweeper, in seconds
    pub rate_limit_cleanup_interval: f64,
    /// Number of concurrent task workers
    pub concurrency: usize,
    /// Hard cap on queued tasks
    pub max_tasks_queue: usize,
    /// Age after which terminal task records are removed, in seconds
    pub cleanup_interval: u64,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            task_min_time: env_parse("TASK_MIN_TIME", defaults::default_task_min_time())?,
            task_max_time: env_parse("TASK_MAX_TIME", defaults::default_task_max_time())?,
            max_requests_per_time_per_ip: env_parse(
                "MAX_REQUESTS_PER_TIME_PER_IP",
                defaults::default_max_requests_per_ip(),
            )?,
            rate_limit_period: env_parse("RATE_LIMIT_PERIOD", defaults::default_rate_limit_period())?,
            rate_limit_cleanup_interval: env_parse(
                "RATE_LIMIT_CLEANUP_INTERVAL",
                defaults::default_rate_limit_cleanup_interval(),
            )?,
            concurrency: env_parse("CONCURRENCY", defaults::default_concurrency())?,
            max_tasks_queue: env_parse("MAX_TASKS_QUEUE", defaults::default_max_tasks_queue())?,
            cleanup_interval: env_parse(
                "CLEANUP_INTERVAL",
                defaults::default_cleanup_after_seconds(),
            )?,
        })
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", raw, name, e)),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(anyhow!("Failed to read {}: {}", name, e)),
    }
}
