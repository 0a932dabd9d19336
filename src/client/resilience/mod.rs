//! Bounded retry for fallible remote calls.

mod backoff;

pub use backoff::Backoff;

use std::future::Future;
use std::time::Duration;

/// How many times a failed call is retried, and the ceiling on the sleep
/// between attempts. A zero `max_delay` retries immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, max_delay: Duration) -> Self {
        Self {
            max_retries,
            max_delay,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Runs an operation up to `max_retries + 1` times, sleeping with
/// [`Backoff`] between attempts but never after the last one.
///
/// The controller does not interpret errors; callers decide what is worth
/// retrying through [`RetryController::execute_when`].
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    backoff: Backoff,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            backoff: Backoff::new(policy.max_delay),
        }
    }

    pub fn with_backoff(policy: RetryPolicy, backoff: Backoff) -> Self {
        Self { policy, backoff }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_when(operation, |_| true).await
    }

    pub async fn execute_when<F, Fut, T, E, P>(&self, mut operation: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= self.policy.max_retries || !retryable(&error) {
                return Err(error);
            }

            let delay = self.backoff.delay_for(attempt);
            if !delay.is_zero() {
                tracing::debug!(
                    attempt = attempt + 1,
                    max_attempts = self.policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_always_failing_runs_max_retries_plus_one() {
        let controller = RetryController::new(RetryPolicy::new(3, Duration::ZERO));
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = controller
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(format!("failure {n}")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err(), "failure 4");
    }

    #[tokio::test]
    async fn test_success_on_kth_attempt() {
        let controller = RetryController::new(RetryPolicy::new(5, Duration::ZERO));
        let calls = AtomicU32::new(0);

        let result = controller
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if n < 3 { Err("transient") } else { Ok(n) } }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let controller = RetryController::new(RetryPolicy::none());
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = controller
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let controller = RetryController::new(RetryPolicy::new(4, Duration::ZERO));
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = controller
            .execute_when(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal") }
                },
                |e| *e != "fatal",
            )
            .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_max_delay_does_not_sleep() {
        let controller = RetryController::new(RetryPolicy::new(20, Duration::ZERO));
        let started = std::time::Instant::now();

        let _: Result<(), ()> = controller.execute(|| async { Err(()) }).await;

        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts_only() {
        let policy = RetryPolicy::new(2, Duration::from_secs(10));
        let controller = RetryController::with_backoff(policy, Backoff::seeded(policy.max_delay, 3));
        let started = tokio::time::Instant::now();

        let _: Result<(), ()> = controller.execute(|| async { Err(()) }).await;

        // attempt 0 sleeps [0.5s, 1s), attempt 1 sleeps [1s, 2s), no sleep after the last
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1500), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    }
}
