//! Retry policy with exponential backoff for provider calls
//!
//! The policy counts *total* calls: `max_attempts = 3` means one first try and at
//! most two retries. Only transient provider failures are retried
//! (see [`ProviderError::is_retryable`]).

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::error::ProviderError;
use crate::domain::models::RetryConfig;

/// Why a retried operation gave up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// Last provider failure, either fatal or the one that hit the ceiling
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Cancellation arrived before the operation succeeded
    #[error("cancelled")]
    Cancelled,
}

/// Result of a retried operation together with the number of calls made
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, RetryError>,
    /// Provider calls issued, including the one that succeeded or failed last
    pub attempts: u32,
}

/// Retry policy with exponential backoff
///
/// Backoff doubles after every failed call: with the defaults 2s → 4s → 8s, capped
/// at `max_backoff_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of calls, first try included
    max_attempts: u32,
    /// Backoff before the first retry in milliseconds
    initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// A `max_attempts` of zero is treated as one call.
    ///
    /// # Example
    /// ```
    /// use tribunal::application::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(3, 2_000, 10_000);
    /// assert_eq!(policy.max_attempts(), 3);
    /// ```
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(initial_backoff_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Execute an operation, abandoning the in-flight call as soon as `cancel` fires
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.run(cancel, operation, true).await
    }

    /// Execute an operation, letting an in-flight call finish after cancellation
    ///
    /// Cancellation is only observed between calls, so no retry is issued once
    /// `cancel` has fired.
    pub async fn execute_to_completion<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.run(cancel, operation, false).await
    }

    async fn run<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
        race_in_flight: bool,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return RetryOutcome {
                    result: Err(RetryError::Cancelled),
                    attempts,
                };
            }

            attempts += 1;
            let result = if race_in_flight {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return RetryOutcome { result: Err(RetryError::Cancelled), attempts };
                    }
                    result = operation() => result,
                }
            } else {
                operation().await
            };

            match result {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(attempts, "Operation succeeded after retries");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(err) if err.is_retryable() && attempts < self.max_attempts => {
                    let backoff = self.calculate_backoff(attempts - 1);
                    warn!(
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        error = %err,
                        ?backoff,
                        "Transient provider error, retrying"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            return RetryOutcome { result: Err(RetryError::Cancelled), attempts };
                        }
                        () = sleep(backoff) => {}
                    }
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(attempts, error = %err, "Retry ceiling reached");
                    } else {
                        debug!(error = %err, "Fatal provider error, not retrying");
                    }
                    return RetryOutcome {
                        result: Err(RetryError::Provider(err)),
                        attempts,
                    };
                }
            }
        }
    }

    /// Formula: min(initial_backoff * 2^retry, max_backoff)
    fn calculate_backoff(&self, retry: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(retry))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }
}

impl Default for RetryPolicy {
    /// 3 calls, 2s initial backoff, 10s max backoff
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
