//! Bounded worker pools for the two upstream APIs.
//!
//! The source (TestRail) pool just caps concurrency: `Semaphore(8)`, no
//! extra pacing, since TestRail's read endpoints tolerate bursts. The
//! target (Qase) pool adds a rolling request-count window on top of the
//! concurrency cap, because Qase enforces a hard ceiling of 230 requests
//! per 10-second window regardless of concurrency.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

const TARGET_WORKERS: usize = 8;
const SOURCE_WORKERS: usize = 8;
const WINDOW: Duration = Duration::from_secs(10);
const WINDOW_LIMIT: usize = 230;

/// Plain bounded pool: holds a permit for the lifetime of the guard,
/// nothing more.
#[derive(Clone)]
pub struct SourcePool {
    semaphore: Arc<Semaphore>,
}

impl SourcePool {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(SOURCE_WORKERS)),
        }
    }

    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("source pool semaphore never closes")
    }
}

impl Default for SourcePool {
    fn default() -> Self {
        Self::new()
    }
}

/// Concurrency cap plus a rolling request-count window shared across all
/// workers. `acquire()` returns once both a worker slot is free and the
/// window has room for one more request; holding the returned guard also
/// records the request's timestamp in the window.
#[derive(Clone)]
pub struct TargetPool {
    semaphore: Arc<Semaphore>,
    window: Arc<Mutex<VecDeque<Instant>>>,
}

pub struct TargetPermit {
    _semaphore_permit: OwnedSemaphorePermit,
}

impl TargetPool {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(TARGET_WORKERS)),
            window: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub async fn acquire(&self) -> TargetPermit {
        let semaphore_permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("target pool semaphore never closes");

        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = window.front() {
                    if now.duration_since(oldest) >= WINDOW {
                        window.pop_front();
                    } else {
                        break;
                    }
                }
                if window.len() < WINDOW_LIMIT {
                    window.push_back(now);
                    None
                } else {
                    let oldest = *window.front().expect("window full implies non-empty");
                    Some(WINDOW - now.duration_since(oldest))
                }
            };

            match wait {
                None => break,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }

        TargetPermit {
            _semaphore_permit: semaphore_permit,
        }
    }
}

impl Default for TargetPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn source_pool_caps_concurrency() {
        let pool = SourcePool::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = pool.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _permit = pool.acquire().await;
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= SOURCE_WORKERS);
    }

    #[tokio::test]
    async fn target_pool_allows_requests_under_window_limit() {
        let pool = TargetPool::new();
        for _ in 0..10 {
            let _permit = pool.acquire().await;
        }
        // Should complete promptly since 10 << WINDOW_LIMIT.
    }
}
