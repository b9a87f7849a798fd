//! Minimum-spacing rate limiter for upstream calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Default spacing between two upstream calls.
///
/// RTM allows roughly one call per second per user; 500ms is the floor we
/// enforce across the whole process.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Serializes callers so that consecutive calls commit at least
/// `min_interval` apart.
///
/// The lock is held across the sleep, so waiters are released one at a time
/// in arrival order (tokio's mutex is fair).
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until enough time has passed since the previous call, then
    /// record the current instant as the new commit point.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                trace!(delay = ?(ready_at - Instant::now()), "rate limiter delaying call");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}
