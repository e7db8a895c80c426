use railmigrate_harness::rate_limiter::{MultiKeyRateLimiter, RateLimitConfig, RateLimiter};
use std::time::Duration;

#[tokio::test]
async fn first_acquire_does_not_wait() {
    let limiter = RateLimiter::new(RateLimitConfig::per_minute(60));
    let start = tokio::time::Instant::now();
    limiter.acquire().await;
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[tokio::test]
async fn second_acquire_waits_out_min_interval() {
    // 1200/min -> 50ms between grants.
    let limiter = RateLimiter::new(RateLimitConfig::per_minute(1200));
    limiter.acquire().await;
    let start = tokio::time::Instant::now();
    limiter.acquire().await;
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[test]
fn retry_delay_floors_at_one_second() {
    let limiter = RateLimiter::new(RateLimitConfig::per_minute(6000));
    assert_eq!(limiter.retry_delay(), Duration::from_secs(1));
}

#[test]
fn retry_delay_follows_min_interval_above_the_floor() {
    let limiter = RateLimiter::new(RateLimitConfig::per_minute(20));
    assert_eq!(limiter.retry_delay(), Duration::from_secs(3));
}

#[tokio::test]
async fn keys_are_independent() {
    let limiter = MultiKeyRateLimiter::new()
        .with_key("testrail", RateLimitConfig::per_minute(600))
        .with_key("qase", RateLimitConfig::per_minute(1380));

    limiter.acquire("testrail").await.unwrap();
    limiter.acquire("qase").await.unwrap();
}

#[tokio::test]
async fn unknown_key_errors() {
    let limiter = MultiKeyRateLimiter::new().with_key("testrail", RateLimitConfig::per_minute(600));
    assert!(limiter.acquire("qase").await.is_err());
}
