//! Tests for the sliding-window rate limiter

use crate::rate_limiter::RateLimiter;
use futures_util::future::join_all;
use tokio::time::Duration;

#[tokio::test]
async fn test_concurrent_burst_admits_exactly_max_requests() {
    let limiter = RateLimiter::new(5, 2.0, 300.0);

    let results = join_all((0..20).map(|_| limiter.allow("burst"))).await;
    let admitted = results.iter().filter(|&&allowed| allowed).count();

    assert_eq!(admitted, 5);
    assert_eq!(results.len() - admitted, 15);
    assert_eq!(limiter.remaining("burst").await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_window_slides_past_old_requests() {
    let limiter = RateLimiter::new(2, 2.0, 300.0);

    assert!(limiter.allow("client").await);
    assert!(limiter.allow("client").await);
    assert!(!limiter.allow("client").await);

    // Once the window has passed, the budget is back.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(limiter.allow("client").await);
    assert_eq!(limiter.remaining("client").await, 1);
}

#[tokio::test]
async fn test_remaining_reflects_usage() {
    let limiter = RateLimiter::new(3, 60.0, 300.0);

    assert_eq!(limiter.remaining("fresh").await, 3);
    limiter.allow("fresh").await;
    assert_eq!(limiter.remaining("fresh").await, 2);
}

#[tokio::test]
async fn test_reset_single_key_and_all() {
    let limiter = RateLimiter::new(1, 60.0, 300.0);

    assert!(limiter.allow("a").await);
    assert!(limiter.allow("b").await);
    assert!(!limiter.allow("a").await);

    limiter.reset(Some("a")).await;
    assert!(limiter.allow("a").await);
    assert!(!limiter.allow("b").await);

    limiter.reset(None).await;
    assert_eq!(limiter.tracked_key_count().await, 0);
    assert!(limiter.allow("b").await);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_drops_empty_buckets() {
    let limiter = RateLimiter::new(2, 1.0, 5.0);

    limiter.allow("one").await;
    limiter.allow("two").await;
    assert_eq!(limiter.tracked_key_count().await, 2);

    limiter.start_cleanup().await;
    // First sweep runs one interval after start; by then both buckets
    // contain only expired timestamps.
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(limiter.tracked_key_count().await, 0);

    limiter.stop_cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_isolated() {
    let limiter = RateLimiter::new(1, 60.0, 300.0);

    assert!(limiter.allow("1.1.1.1").await);
    assert!(limiter.allow("2.2.2.2").await);
    assert!(!limiter.allow("1.1.1.1").await);
    assert_eq!(limiter.remaining("2.2.2.2").await, 0);
}
