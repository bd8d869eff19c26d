//! Bounded, fixed-delay retry for a single async operation.
//!
//! The delay between attempts is constant, not exponential. By default only
//! errors that report themselves as [`Retryable`] (for [`AppError`], the
//! `TransientUpstream` parse/format failures) are retried, so permanent
//! business failures surface on the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientUpstream(_))
    }
}

/// Bookkeeping for one scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// The attempt that just failed (1-based).
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub delay_ms: u64,
}

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type RetryHook<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// Retry policy wrapping one async operation.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    delay: Duration,
    is_retryable: Predicate<E>,
    on_retry: Option<RetryHook<E>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            delay: self.delay,
            is_retryable: Arc::clone(&self.is_retryable),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("has_on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl<E: Retryable + 'static> RetryPolicy<E> {
    /// Creates a policy that retries [`Retryable`] errors.
    ///
    /// `max_attempts` counts the first call; values below 1 are treated as 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self::with_predicate(max_attempts, delay, E::is_retryable)
    }
}

impl<E: 'static> RetryPolicy<E> {
    /// Creates a policy with a caller-supplied retry predicate.
    pub fn with_predicate(
        max_attempts: u32,
        delay: Duration,
        is_retryable: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            is_retryable: Arc::new(is_retryable),
            on_retry: None,
        }
    }

    /// Registers an observer called before each retry sleep.
    pub fn on_retry(mut self, hook: impl Fn(&E, u32) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Returns the maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the fixed delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or exhausts the attempts. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt_number = 1;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt_number >= self.max_attempts || !(self.is_retryable)(&err) {
                return Err(err);
            }

            let attempt = RetryAttempt {
                attempt_number,
                max_attempts: self.max_attempts,
                delay_ms: self.delay.as_millis() as u64,
            };
            if let Some(hook) = &self.on_retry {
                hook(&err, attempt.attempt_number);
            }
            tracing::warn!(
                attempt = attempt.attempt_number,
                max_attempts = attempt.max_attempts,
                delay_ms = attempt.delay_ms,
                error = %err,
                "operation failed, retrying"
            );
            metrics::counter!("retry_attempts_total").increment(1);

            tokio::time::sleep(self.delay).await;
            attempt_number += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn transient() -> AppError {
        AppError::TransientUpstream("unexpected token".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(100));

        let result = policy
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(transient()) } else { Ok(n) }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts_with_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(10));

        let result: Result<(), AppError> = policy
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(AppError::TransientUpstream(format!("attempt {n}")))
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            AppError::TransientUpstream("attempt 2".to_string())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(10));

        let result: Result<(), AppError> = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Permanent("insufficient credits".to_string()))
            })
            .await;

        assert!(matches!(result, Err(AppError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_sees_each_failed_attempt() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_hook = Arc::clone(&seen);
        let policy = RetryPolicy::new(3, Duration::from_millis(10))
            .on_retry(move |_err: &AppError, attempt| seen_hook.lock().unwrap().push(attempt));

        let _ = policy.run(|| async { Err::<(), _>(transient()) }).await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_fixed() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        let start = tokio::time::Instant::now();

        let _ = policy.run(|| async { Err::<(), _>(transient()) }).await;

        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let calls = AtomicU32::new(0);
        let policy: RetryPolicy<String> =
            RetryPolicy::with_predicate(3, Duration::ZERO, |e: &String| e == "again");

        let result: Result<(), String> = policy
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 { Err("again".to_string()) } else { Err("stop".to_string()) }
            })
            .await;

        assert_eq!(result.unwrap_err(), "stop");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy: RetryPolicy<AppError> = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }
}
