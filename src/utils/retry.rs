//! Retry utilities with exponential backoff for resilient API calls.

use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::sources::SourceError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum total time to spend on retries (including delays)
    pub max_total_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff delay before attempt `attempt + 1`
    fn backoff(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.as_secs_f64();
        let exp = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powf(attempt.saturating_sub(1) as f64);
        if exp.is_finite() {
            Duration::from_secs_f64(exp.clamp(0.0, cap))
        } else {
            self.max_delay
        }
    }
}

/// Transient errors that should trigger a retry.
///
/// Rate limits are deliberately absent: the paging layer pauses and tries again on the
/// next sweep, so retrying them here would double the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientError {
    /// Connection failure or timeout
    Network,
    /// Server error (5xx)
    ServerError(u16),
}

impl TransientError {
    /// Check if a SourceError represents a transient error
    pub fn from_source_error(err: &SourceError) -> Option<Self> {
        match err {
            SourceError::Network(_) => Some(TransientError::Network),
            SourceError::Server(status) => Some(TransientError::ServerError(*status)),
            _ => None,
        }
    }

    /// Minimum delay for this error
    pub fn recommended_delay(&self) -> Duration {
        match self {
            TransientError::ServerError(503) => Duration::from_secs(10),
            TransientError::ServerError(504) => Duration::from_secs(5),
            TransientError::ServerError(_) | TransientError::Network => Duration::from_secs(2),
        }
    }
}

/// Execute an async operation with retry logic
///
/// Transient errors are retried with exponential backoff until `max_attempts` or
/// `max_total_time` is reached; the last error is then returned. Any other error is
/// returned immediately.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempts = 0;
    let mut total_elapsed = Duration::ZERO;
    let mut operation = operation;

    loop {
        attempts += 1;

        let error = match timeout(config.max_total_time, operation()).await {
            Ok(Ok(result)) => {
                if attempts > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Ok(Err(error)) => error,
            Err(_) => SourceError::Network("Operation timed out".to_string()),
        };

        let transient = match TransientError::from_source_error(&error) {
            Some(transient) => transient,
            None => return Err(error),
        };

        // The error-specific floor never exceeds the configured ceiling
        let delay = config
            .backoff(attempts)
            .max(transient.recommended_delay())
            .min(config.max_delay);
        total_elapsed += delay;

        if attempts >= config.max_attempts || total_elapsed >= config.max_total_time {
            tracing::warn!(
                "Operation failed after {} attempts (total elapsed: {:?}): {}",
                attempts,
                total_elapsed,
                error
            );
            return Err(error);
        }

        tracing::warn!(
            "Transient error on attempt {}: {}, retrying in {:?}",
            attempts,
            error,
            delay
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(RetryConfig::default(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Ok("success")
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(fast_config(4), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    let count = *call_count.borrow();
                    if count == 1 {
                        Err(SourceError::Network("connection reset".to_string()))
                    } else if count == 2 {
                        Err(SourceError::Server(502))
                    } else {
                        Ok("success")
                    }
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<(), SourceError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(3), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::Server(500))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(SourceError::Server(500))));
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_permanent_error() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, SourceError> = {
            let call_count = call_count.clone();
            with_retry(fast_config(5), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::Parse("not json".to_string()))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(SourceError::Parse(_))));
        assert_eq!(*call_count.borrow(), 1);
    }

    #[test]
    fn test_transient_error_detection() {
        assert!(TransientError::from_source_error(&SourceError::Network("refused".into())).is_some());
        assert_eq!(
            TransientError::from_source_error(&SourceError::Server(503)),
            Some(TransientError::ServerError(503))
        );
        assert!(TransientError::from_source_error(&SourceError::RateLimit).is_none());
        assert!(TransientError::from_source_error(&SourceError::Parse("x".into())).is_none());
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(100),
        };
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(3), Duration::from_secs(4));
        assert_eq!(config.backoff(8), Duration::from_secs(5));
        assert_eq!(
            TransientError::ServerError(503).recommended_delay(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_backoff_never_goes_negative() {
        let config = RetryConfig {
            backoff_multiplier: -2.0,
            ..fast_config(3)
        };
        assert_eq!(config.backoff(2), Duration::ZERO);
        assert_eq!(config.backoff(3), Duration::from_millis(4));

        let nan = RetryConfig {
            backoff_multiplier: f64::NAN,
            ..fast_config(3)
        };
        assert_eq!(nan.backoff(2), nan.max_delay);
    }

    #[tokio::test]
    async fn test_retry_with_negative_multiplier_gives_up_cleanly() {
        let config = RetryConfig {
            backoff_multiplier: -2.0,
            ..fast_config(3)
        };
        let result: Result<(), SourceError> =
            with_retry(config, || async { Err(SourceError::Server(500)) }).await;
        assert!(matches!(result, Err(SourceError::Server(500))));
    }

    #[tokio::test]
    async fn test_no_retry_config_makes_one_attempt() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<(), SourceError> = {
            let call_count = call_count.clone();
            with_retry(RetryConfig::none(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::Network("refused".to_string()))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(SourceError::Network(_))));
        assert_eq!(*call_count.borrow(), 1);
    }
}
