//! Bounded retry for rate-limited backend calls
//!
//! One wrapper drives every retried call in the pipeline. An error is retried
//! when the caller's predicate accepts it; the wait before the next attempt is
//! the backend's retry hint when present, else a fixed fallback delay.

use crate::config::RetryConfig;
use crate::error::RetryableError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy with a bounded number of total attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new RetryPolicy with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a RetryPolicy with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Execute an async operation, retrying errors that report themselves retryable
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        self.execute_if(operation, |err: &E| err.is_retryable())
            .await
    }

    /// Execute an async operation, retrying errors accepted by `should_retry`
    ///
    /// The operation runs at most `max_attempts` times. The last error is
    /// returned once attempts are exhausted or a rejected error is seen.
    pub async fn execute_if<F, Fut, T, E, P>(&self, operation: F, should_retry: P) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !should_retry(&err) {
                        return Err(err);
                    }
                    if attempt >= max_attempts {
                        warn!(
                            attempts = attempt,
                            max_attempts = max_attempts,
                            error = %err,
                            "Retry attempts exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.delay_for(&err);
                    debug!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after rate-limit signal"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Wait before retrying after `err`
    ///
    /// The backend's hint wins over the configured fallback.
    pub fn delay_for<E: RetryableError>(&self, err: &E) -> Duration {
        err.retry_after()
            .unwrap_or_else(|| Duration::from_millis(self.config.fallback_delay_ms))
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
