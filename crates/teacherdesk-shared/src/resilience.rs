//! Deadline and bounded-retry wrappers for calls to external services.
//!
//! `with_timeout` races an operation against a timer. `with_timeout_and_retry`
//! builds a fresh operation per attempt and retries a fixed number of times
//! with a fixed delay between attempts. There is no backoff growth and no
//! jitter.
//!
//! A timed-out operation is dropped, which cancels it at its next await
//! point. Callers that need the work to finish regardless should spawn it
//! and wrap the `JoinHandle` instead.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
use crate::error::{RetryError, TimeoutError};

/// Await `operation` for at most `timeout`.
///
/// - the operation finishes first: its result is returned as-is, errors
///   included (the fallback never replaces an operation error)
/// - the timer fires first: `fallback` if one was given, otherwise
///   [`TimeoutError::Elapsed`]
pub async fn with_timeout<F, T, E>(
    operation: F,
    timeout: Duration,
    fallback: Option<T>,
) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Operation(e)),
        Err(_) => match fallback {
            Some(value) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "Timed out, using fallback");
                Ok(value)
            }
            None => Err(TimeoutError::Elapsed(timeout)),
        },
    }
}

/// Options for [`with_timeout_and_retry`].
#[derive(Debug, Clone)]
pub struct RetryOptions<T> {
    /// Deadline applied to each attempt separately.
    pub timeout: Duration,
    /// Total number of attempts. Zero is treated as one.
    pub max_retries: u32,
    /// Pause after a failed attempt, skipped after the last one.
    pub retry_delay: Duration,
    /// Returned when every attempt failed.
    pub fallback: Option<T>,
    /// Service name used in logs and in the final error.
    pub label: String,
}

impl<T> RetryOptions<T> {
    pub fn new(label: impl Into<String>, timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            fallback: None,
            label: label.into(),
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn fallback(mut self, value: T) -> Self {
        self.fallback = Some(value);
        self
    }
}

/// Run `factory()` up to `options.max_retries` times, each attempt bounded by
/// `options.timeout`, stopping at the first success.
pub async fn with_timeout_and_retry<F, Fut, T, E>(
    mut factory: F,
    options: RetryOptions<T>,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let RetryOptions {
        timeout,
        max_retries,
        retry_delay,
        fallback,
        label,
    } = options;
    let attempts = max_retries.max(1);

    let mut attempt = 1;
    loop {
        match with_timeout(factory(), timeout, None).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label = %label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    label = %label,
                    attempt,
                    max_attempts = attempts,
                    retry_in_ms = retry_delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(retry_delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(label = %label, attempts, error = %e, "All attempts failed");
                return match fallback {
                    Some(value) => Ok(value),
                    None => Err(RetryError {
                        label,
                        attempts,
                        last: e,
                    }),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_fallback_errors_at_deadline() {
        let start = Instant::now();
        let result = with_timeout(
            pending::<Result<u32, &str>>(),
            Duration::from_millis(100),
            None,
        )
        .await;

        assert!(start.elapsed() >= Duration::from_millis(100));
        let err = result.unwrap_err();
        assert!(err.is_elapsed());
        assert_eq!(err.to_string(), "operation timed out after 100ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_fallback_returns_fallback() {
        let start = Instant::now();
        let result = with_timeout(
            pending::<Result<u32, &str>>(),
            Duration::from_millis(250),
            Some(7),
        )
        .await;

        assert!(start.elapsed() >= Duration::from_millis(250));
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_success_wins_over_fallback() {
        let op = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, &str>(1)
        };
        let result = with_timeout(op, Duration::from_millis(100), Some(99)).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_is_not_replaced_by_fallback() {
        let op = async { Err::<u32, _>("database unavailable") };
        let result = with_timeout(op, Duration::from_millis(100), Some(99)).await;

        match result {
            Err(TimeoutError::Operation(e)) => assert_eq!(e, "database unavailable"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_at_first_success() {
        let mut calls = 0u32;
        let factory = || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err::<u32, _>("flaky")
                } else {
                    Ok(n)
                }
            }
        };

        let options = RetryOptions::new("openai", Duration::from_millis(100))
            .max_retries(5)
            .retry_delay(Duration::from_millis(10));
        let result = with_timeout_and_retry(factory, options).await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_returns_fallback_after_fixed_delay() {
        let mut calls = 0u32;
        let factory = || {
            calls += 1;
            async { Err::<&str, _>("down") }
        };

        let start = Instant::now();
        let options = RetryOptions::new("instantdb", Duration::from_millis(100))
            .retry_delay(Duration::from_millis(1000))
            .fallback("cached");
        let result = with_timeout_and_retry(factory, options).await;

        assert_eq!(result.unwrap(), "cached");
        assert_eq!(calls, DEFAULT_MAX_RETRIES);
        assert_eq!(
            start.elapsed(),
            Duration::from_millis(1000) * (DEFAULT_MAX_RETRIES - 1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_error_names_attempts_and_cause() {
        let start = Instant::now();
        let options = RetryOptions::<()>::new("service", Duration::from_millis(100))
            .max_retries(2)
            .retry_delay(Duration::from_millis(10));
        let result = with_timeout_and_retry(|| async { Err::<(), _>("boom") }, options).await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.to_string().contains("failed after 2 attempts: boom"));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempt_is_retried() {
        let mut calls = 0u32;
        let factory = || {
            calls += 1;
            let n = calls;
            async move {
                if n == 1 {
                    pending::<()>().await;
                }
                Ok::<_, &str>(n)
            }
        };

        let start = Instant::now();
        let options = RetryOptions::new("chat", Duration::from_millis(50))
            .retry_delay(Duration::from_millis(5));
        let result = with_timeout_and_retry(factory, options).await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(start.elapsed(), Duration::from_millis(55));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_timeout_is_reported() {
        let options = RetryOptions::<u32>::new("images", Duration::from_millis(20))
            .max_retries(2)
            .retry_delay(Duration::from_millis(1));
        let result =
            with_timeout_and_retry(|| pending::<Result<u32, &str>>(), options).await;

        let err = result.unwrap_err();
        assert!(err.last.is_elapsed());
        assert_eq!(
            err.to_string(),
            "images failed after 2 attempts: operation timed out after 20ms"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_still_runs_once() {
        let mut calls = 0u32;
        let factory = || {
            calls += 1;
            async { Ok::<_, &str>("done") }
        };
        let options = RetryOptions::new("once", Duration::from_millis(10)).max_retries(0);

        assert_eq!(with_timeout_and_retry(factory, options).await.unwrap(), "done");
        assert_eq!(calls, 1);
    }
}
