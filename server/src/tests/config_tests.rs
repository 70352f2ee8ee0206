//! Tests for environment-based configuration loading

use crate::config::ServerConfig;
use std::sync::Mutex;

/// Environment variables are process-global; serialize the tests that
/// touch them.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const ALL_VARS: [&str; 8] = [
    "TASK_MIN_TIME",
    "TASK_MAX_TIME",
    "MAX_REQUESTS_PER_TIME_PER_IP",
    "RATE_LIMIT_PERIOD",
    "RATE_LIMIT_CLEANUP_INTERVAL",
    "CONCURRENCY",
    "MAX_TASKS_QUEUE",
    "CLEANUP_INTERVAL",
];

fn clear_env() {
    for name in ALL_VARS {
        std::env::remove_var(name);
    }
}

#[test]
fn test_defaults_apply_when_env_is_empty() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_env();

    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.task_min_time, 5);
    assert_eq!(config.task_max_time, 30);
    assert_eq!(config.max_requests_per_time_per_ip, 10);
    assert_eq!(config.rate_limit_period, 60.0);
    assert_eq!(config.rate_limit_cleanup_interval, 300.0);
    assert_eq!(config.concurrency, 5);
    assert_eq!(config.max_tasks_queue, 100);
    assert_eq!(config.cleanup_interval, 600);
}

#[test]
fn test_env_values_override_defaults() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_env();

    std::env::set_var("CONCURRENCY", "2");
    std::env::set_var("MAX_TASKS_QUEUE", "7");
    std::env::set_var("RATE_LIMIT_PERIOD", "1.5");
    std::env::set_var("CLEANUP_INTERVAL", "0");

    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.concurrency, 2);
    assert_eq!(config.max_tasks_queue, 7);
    assert_eq!(config.rate_limit_period, 1.5);
    assert_eq!(config.cleanup_interval, 0);

    clear_env();
}

#[test]
fn test_unparseable_value_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_env();

    std::env::set_var("CONCURRENCY", "many");
    let error = ServerConfig::from_env().unwrap_err();
    assert!(error.to_string().contains("CONCURRENCY"));

    clear_env();
}
