//! Rate gate for outbound API calls.
//!
//! TestRail and Qase both document a maximum request rate rather than a
//! token-bucket burst allowance, so this is a minimum-interval sleep gate:
//! every permit request waits at least `min_interval` since the last one
//! was granted, per key. There is no burst credit to spend down — this is
//! deliberately simpler than a token bucket because the APIs being called
//! don't reward bursting, they just reject it.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limiter key `{0}` not configured")]
    UnknownKey(String),
}

/// Gate configuration for one key: the target requests-per-minute rate, and
/// the minimum delay enforced between any two grants (never less than one
/// second, matching the reference implementation's floor).
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
}

impl RateLimitConfig {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self { requests_per_minute }
    }

    fn min_interval(&self) -> Duration {
        let rpm = self.requests_per_minute.max(1) as f64;
        Duration::from_secs_f64((60.0 / rpm).max(0.0))
    }

    fn retry_delay(&self) -> Duration {
        self.min_interval().max(Duration::from_secs(1))
    }
}

/// A single-key sleep gate: `acquire()` blocks the caller until at least
/// `min_interval` has passed since the previous grant, then returns.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            last_grant: Mutex::new(None),
        }
    }

    /// Block until a request may proceed, then record the grant. Call this
    /// immediately before making the HTTP request it is gating.
    pub async fn acquire(&self) {
        let min_interval = self.config.min_interval();
        let mut guard = self.last_grant.lock().await;
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                let wait = min_interval - elapsed;
                trace!(?wait, "rate gate waiting");
                tokio::time::sleep(wait).await;
            }
        }
        *guard = Some(Instant::now());
    }

    /// The delay a caller should wait before retrying after a 429 response:
    /// at least the configured minimum interval, never less than one second.
    pub fn retry_delay(&self) -> Duration {
        self.config.retry_delay()
    }
}

/// Enforces independent gates keyed by name (e.g. `"testrail"`, `"qase"`),
/// so each upstream API paces itself against its own documented limit.
#[derive(Debug, Default)]
pub struct MultiKeyRateLimiter {
    gates: HashMap<String, RateLimiter>,
}

impl MultiKeyRateLimiter {
    pub fn new() -> Self {
        Self {
            gates: HashMap::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>, config: RateLimitConfig) -> Self {
        self.gates.insert(key.into(), RateLimiter::new(config));
        self
    }

    pub async fn acquire(&self, key: &str) -> Result<(), RateLimitError> {
        let gate = self
            .gates
            .get(key)
            .ok_or_else(|| RateLimitError::UnknownKey(key.to_string()))?;
        gate.acquire().await;
        Ok(())
    }

    pub fn retry_delay(&self, key: &str) -> Result<Duration, RateLimitError> {
        self.gates
            .get(key)
            .map(|g| g.retry_delay())
            .ok_or_else(|| RateLimitError::UnknownKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn acquire_is_immediate_the_first_time() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(60));
        let start = tokio::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < StdDuration::from_millis(50));
    }

    #[tokio::test]
    async fn acquire_enforces_min_interval() {
        // 600/min -> 100ms between grants.
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(600));
        limiter.acquire().await;
        let start = tokio::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= StdDuration::from_millis(90));
    }

    #[test]
    fn retry_delay_has_a_one_second_floor() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(6000));
        assert_eq!(limiter.retry_delay(), StdDuration::from_secs(1));
    }

    #[test]
    fn retry_delay_matches_min_interval_when_larger() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(30));
        assert_eq!(limiter.retry_delay(), StdDuration::from_secs(2));
    }

    #[tokio::test]
    async fn multi_key_gates_are_independent() {
        let limiter = MultiKeyRateLimiter::new()
            .with_key("testrail", RateLimitConfig::per_minute(600))
            .with_key("qase", RateLimitConfig::per_minute(60));

        limiter.acquire("testrail").await.unwrap();
        limiter.acquire("qase").await.unwrap();
        assert!(limiter.acquire("unknown").await.is_err());
    }
}
