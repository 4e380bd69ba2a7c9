// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff.
//!
//! Bulk writes and index administration call the engine over the network;
//! transient failures are retried a bounded number of times before the
//! error is surfaced.
//!
//! # Example
//!
//! ```
//! use search_bridge::RetryConfig;
//! use std::time::Duration;
//!
//! let bulk = RetryConfig::bulk();
//! assert_eq!(bulk.max_attempts, 5);
//!
//! let admin = RetryConfig::admin();
//! assert_eq!(admin.max_attempts, 3);
//!
//! let custom = RetryConfig::new(4, Duration::from_millis(50), Duration::from_secs(1));
//! assert_eq!(custom.delay_for(1), Duration::from_millis(50));
//! assert_eq!(custom.delay_for(2), Duration::from_millis(100));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Bounded retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::bulk()
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(max_attempts: usize, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            factor: 2.0,
        }
    }

    /// Bulk submission: 5 attempts, 200ms doubling up to 5s.
    #[must_use]
    pub fn bulk() -> Self {
        Self::new(5, Duration::from_millis(200), Duration::from_secs(5))
    }

    /// Index administration and refresh: 3 quick attempts.
    #[must_use]
    pub fn admin() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(2))
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: usize) -> Duration {
        let exp = retry.saturating_sub(1).min(32) as i32;
        self.initial_delay
            .mul_f64(self.factor.powi(exp))
            .min(self.max_delay)
    }
}

/// Outcome of an exhausted or aborted retry loop.
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: usize,
}

/// Retry every error until `config.max_attempts` is reached.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_when(operation_name, config, operation, |_| true).await
}

/// Retry only errors for which `should_retry` returns true.
///
/// Non-retryable errors return immediately with the attempt count so far.
pub async fn retry_when<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(val) => {
                if attempts > 1 {
                    info!(operation = operation_name, attempts, "Operation succeeded after retry");
                }
                return Ok(val);
            }
            Err(error) => {
                if attempts >= max_attempts || !should_retry(&error) {
                    return Err(RetryError { error, attempts });
                }
                let delay = config.delay_for(attempts);
                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max_attempts,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                crate::metrics::record_retry(operation_name);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        msg: String,
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.msg)
        }
    }

    fn fast(max_attempts: usize) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, RetryError<TestError>> =
            retry("test_op", &fast(3), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = retry("test_op", &fast(5), || {
            let a = counter.clone();
            async move {
                let n = a.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(TestError { msg: format!("fail {}", n), transient: true })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = retry("test_op", &fast(3), || {
            let a = counter.clone();
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                Err(TestError { msg: "always fail".into(), transient: true })
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(err.error.msg.contains("always fail"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_when_stops_on_permanent_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = retry_when(
            "test_op",
            &fast(5),
            || {
                let a = counter.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError { msg: "bad request".into(), transient: false })
                }
            },
            |e: &TestError| e.transient,
        )
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_exponential_backoff_caps_at_max() {
        let config = RetryConfig::new(10, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(400));
        assert_eq!(config.delay_for(4), Duration::from_millis(500));
        assert_eq!(config.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryConfig::bulk().max_attempts, 5);
        assert_eq!(RetryConfig::admin().max_attempts, 3);
        assert_eq!(RetryConfig::none().max_attempts, 1);
        assert_eq!(RetryConfig::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
    }
}
