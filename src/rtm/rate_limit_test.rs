//! Tests for the upstream rate limiter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::rtm::rate_limit::{DEFAULT_MIN_INTERVAL, RateLimiter};

#[test]
fn default_interval_is_500ms() {
    let limiter = RateLimiter::default();
    assert_eq!(limiter.min_interval(), Duration::from_millis(500));
    assert_eq!(DEFAULT_MIN_INTERVAL, Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn first_call_is_not_delayed() {
    let limiter = RateLimiter::new(Duration::from_millis(500));
    let start = Instant::now();

    limiter.wait().await;

    assert_eq!(Instant::now() - start, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn back_to_back_calls_are_spaced() {
    let limiter = RateLimiter::new(Duration::from_millis(500));
    let start = Instant::now();

    for _ in 0..4 {
        limiter.wait().await;
    }

    // 4 calls -> 3 gaps
    assert!(Instant::now() - start >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn no_delay_after_interval_already_elapsed() {
    let limiter = RateLimiter::new(Duration::from_millis(500));
    limiter.wait().await;

    tokio::time::sleep(Duration::from_millis(800)).await;
    let before = Instant::now();
    limiter.wait().await;

    assert_eq!(Instant::now() - before, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_commit_at_least_interval_apart() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(500)));
    let commits = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let limiter = Arc::clone(&limiter);
        let commits = Arc::clone(&commits);
        handles.push(tokio::spawn(async move {
            limiter.wait().await;
            commits.lock().await.push(Instant::now());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut commits = commits.lock().await.clone();
    commits.sort();
    assert_eq!(commits.len(), 5);
    for pair in commits.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(500));
    }
    assert!(*commits.last().unwrap() - commits[0] >= Duration::from_millis(2000));
}
