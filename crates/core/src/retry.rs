//! Timeout and retry policy for calls to external capabilities.
//!
//! Every embedding and generation call goes through [`RetryPolicy::run`]:
//! each attempt is bounded by a timeout, transient failures are retried with
//! exponential backoff, and everything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::config::PipelineSettings;
use crate::error::{AppError, AppResult};

/// Bounded retry with per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles after each one
    pub initial_backoff: Duration,
    /// Budget for a single attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, timeout: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            timeout,
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// Policy that makes exactly one attempt.
    pub fn no_retry(timeout: Duration) -> Self {
        Self::new(0, Duration::ZERO, timeout)
    }

    /// Run `op` until it succeeds, fails permanently, or the retry budget is spent.
    ///
    /// `operation` names the call in logs and in the `Timeout` message.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt: u32 = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(format!(
                    "{} did not complete within {}ms",
                    operation,
                    self.timeout.as_millis()
                ))),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(operation, attempts = attempt + 1, error = %e, "Retry budget exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_two_timeouts_then_success() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(2);

        let result = policy
            .run("embed", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    Ok::<_, AppError>(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeouts_exhaust_budget() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(2);

        let result: AppResult<()> = policy
            .run("embed", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(5);

        let result: AppResult<()> = policy
            .run("generate", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::generation("401 unauthorized")) }
            })
            .await;

        assert!(matches!(result, Err(AppError::Generation { transient: false, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_retried_then_surfaced() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(1);

        let result: AppResult<()> = policy
            .run("generate", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::generation_transient("503")) }
            })
            .await;

        assert!(matches!(result, Err(AppError::Generation { transient: true, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_settings() {
        let settings = PipelineSettings::default();
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.max_retries, settings.max_retries);
        assert_eq!(policy.timeout, Duration::from_secs(settings.timeout_secs));
    }
}
