//! Tests for server construction

use crate::config::ServerConfig;
use crate::Server;

fn test_config() -> ServerConfig {
    ServerConfig {
        task_min_time: 5,
        task_max_time: 30,
        max_requests_per_time_per_ip: 10,
        rate_limit_period: 60.0,
        rate_limit_cleanup_interval: 300.0,
        concurrency: 2,
        max_tasks_queue: 10,
        cleanup_interval: 600,
    }
}

#[tokio::test]
async fn test_server_creation_with_override() {
    let server = Server::new(test_config(), Some("127.0.0.1:8787".to_string()));
    assert!(server.is_ok());
}

#[tokio::test]
async fn test_server_creation_rejects_bad_address() {
    let server = Server::new(test_config(), Some("not-an-address".to_string()));
    assert!(server.is_err());
}

#[tokio::test]
async fn test_server_creation_uses_default_address() {
    let server = Server::new(test_config(), None);
    assert!(server.is_ok());
}
