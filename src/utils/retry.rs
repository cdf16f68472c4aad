//! Retry utilities for upstream and webhook calls
//!
//! A small bounded retry with exponential backoff. The caller decides which
//! errors are worth another attempt; everything else returns immediately.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = single attempt)
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a retry configuration with custom delays
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
        }
    }

    /// Calculate delay for a given attempt using exponential backoff
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let exponential =
                self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
            (exponential as u64).min(self.max_delay_ms)
        };

        Duration::from_millis(delay_ms)
    }
}

/// Execute an operation, retrying only the errors `should_retry` accepts
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `max_retries` extra attempts are used up.
///
/// # Example
///
/// ```no_run
/// use relmon::utils::error::SourceError;
/// use relmon::utils::retry::{with_retry_if, RetryConfig};
///
/// async fn fetch_index() -> Result<String, SourceError> {
///     Ok("{}".to_string())
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), SourceError> {
///     let config = RetryConfig::default();
///     let body = with_retry_if(&config, fetch_index, SourceError::is_transient).await?;
///     println!("{body}");
///     Ok(())
/// }
/// ```
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation: F,
    should_retry: P,
) -> Result<T, E>
where
    E: Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = config.calculate_delay(attempt);
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) if attempt >= config.max_retries => {
                warn!(
                    attempts = attempt + 1,
                    error = %e,
                    "Operation failed, giving up"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    attempt = attempt,
                    max_retries = config.max_retries,
                    error = %e,
                    "Operation failed, will retry"
                );
            }
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::SourceError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig::with_delays(3, 1, 5)
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let result = with_retry_if(
            &fast(),
            || async { Ok::<_, SourceError>(42) },
            SourceError::is_transient,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = with_retry_if(
            &fast(),
            move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    let count = attempts.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        return Err(SourceError::Transient("503".into()));
                    }
                    Ok(42)
                }
            },
            SourceError::is_transient,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result: Result<(), SourceError> = with_retry_if(
            &RetryConfig::with_delays(2, 1, 5),
            move || {
                attempts_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::Transient("always down".into())) }
            },
            SourceError::is_transient,
        )
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result: Result<(), SourceError> = with_retry_if(
            &fast(),
            move || {
                attempts_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::NotFound("gone".into())) }
            },
            SourceError::is_transient,
        )
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_calculate_delay() {
        let config = RetryConfig::with_delays(3, 1000, 30_000);

        assert_eq!(config.calculate_delay(0), Duration::from_millis(0));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(1000));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(2000));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig::with_delays(10, 1000, 5000);
        assert_eq!(config.calculate_delay(10), Duration::from_millis(5000));
    }
}
