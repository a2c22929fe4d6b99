// Retry logic with exponential backoff for transient remote failures

use crate::error::GuardError;
use backoff::{backoff::Backoff, ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Create exponential backoff configuration for retries
pub fn create_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(500), // Start at 500ms
        initial_interval: Duration::from_millis(500),
        randomization_factor: 0.3, // Add jitter
        multiplier: 2.0,           // Double each time
        max_interval: Duration::from_secs(30),
        max_elapsed_time: Some(Duration::from_secs(300)),
        ..Default::default()
    }
}

/// Determine if an HTTP status code is retryable
pub fn is_retryable(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Run `operation` until it succeeds, fails permanently, or `max_attempts`
/// is reached.
///
/// Only [`GuardError::is_transient`] errors are retried. Wrap the whole
/// estimate-then-execute unit, never a single remote call, so each attempt
/// re-estimates.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T, GuardError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GuardError>>,
{
    let mut backoff = create_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_transient() || attempt >= max_attempts.max(1) {
                    return Err(e);
                }

                let Some(delay) = backoff.next_backoff() else {
                    warn!("{} giving up after {} attempts: {}", operation_name, attempt, e);
                    return Err(e);
                };

                warn!(
                    "{} failed (attempt {}), retrying after {}ms: {}",
                    operation_name,
                    attempt,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(429));
        assert!(is_retryable(500));
        assert!(is_retryable(502));
        assert!(is_retryable(503));
        assert!(!is_retryable(400));
        assert!(!is_retryable(403));
        assert!(!is_retryable(404));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = with_retry("test", 3, || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(GuardError::QueryExecution(RemoteError::new(Some(503), "busy")))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = with_retry("test", 5, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GuardError::QueryExecution(RemoteError::new(
                Some(400),
                "Syntax error",
            )))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_capped() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = with_retry("test", 3, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GuardError::CostEstimation(RemoteError::transport("timed out")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
