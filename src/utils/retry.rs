//! Exponential backoff for the HTTP collaborators.
//!
//! Only embedding and completion calls go through here. Storage and ingestion
//! errors surface to the caller on first failure.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first call included. Never below 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// `max_retries` from config; zero still makes one attempt.
    #[must_use]
    pub fn attempts(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.max(1),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(delay.as_secs_f64() * self.multiplier).min(self.max_delay)
    }
}

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    Failed { last_error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed { last_error, .. } => Err(last_error),
        }
    }
}

/// Whether a failed call is worth repeating.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of attempts.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> RetryResult<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(error) if attempts < max_attempts && error.is_retryable() => {
                let wait = delay + jitter(delay / 4);
                warn!(
                    operation = label,
                    attempt = attempts,
                    wait_ms = wait.as_millis() as u64,
                    %error,
                    "transient failure, retrying"
                );
                sleep(wait).await;
                delay = config.next_delay(delay);
            }
            Err(error) => {
                if attempts > 1 {
                    warn!(operation = label, attempts, %error, "giving up");
                }
                return RetryResult::Failed {
                    last_error: error,
                    attempts,
                };
            }
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let random = uuid::Uuid::new_v4().as_u128() as u64;
    Duration::from_millis(random % max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryConfig {
        RetryConfig::attempts(attempts).with_initial_delay(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_overloaded_server_is_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(3), "complete", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CompletionError::ServerError("status 503: overloaded".into()))
            } else {
                Ok("answer")
            }
        })
        .await;

        assert_eq!(result.into_result().unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bad_request_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(5), "complete", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(CompletionError::ServerError("status 400: bad request".into()))
        })
        .await;

        match result {
            RetryResult::Failed { attempts, .. } => assert_eq!(attempts, 1),
            RetryResult::Success(_) => panic!("expected failure"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(3), "embed", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(CompletionError::Timeout)
        })
        .await;

        match result {
            RetryResult::Failed { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last_error, CompletionError::Timeout));
            }
            RetryResult::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(0), "embed", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CompletionError>(7)
        })
        .await;

        assert_eq!(result.into_result().unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig::default();
        let mut delay = config.initial_delay;
        for _ in 0..10 {
            delay = config.next_delay(delay);
        }
        assert_eq!(delay, config.max_delay);
    }
}
