//! Exponential backoff for rate-limited OCS calls.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{NextcloudError, NextcloudResult};

/// Retry policy for mutating calls.
///
/// Only [`NextcloudError::RateLimited`] is retried. Every other error is
/// returned on the first occurrence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay, `Retry-After` included.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps. Useful for tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    ///
    /// A server-provided `Retry-After` wins over the computed backoff; both are
    /// capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32, error: &NextcloudError) -> Duration {
        let delay = match error {
            NextcloudError::RateLimited {
                retry_after_secs: Some(secs),
            } => Duration::from_secs(*secs),
            _ => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(retry)),
        };
        delay.min(self.max_delay)
    }

    /// Run `f` until it succeeds, fails with a non-rate-limit error, or the
    /// attempt budget is spent.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> NextcloudResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = NextcloudResult<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_rate_limited() => {
                    if attempt >= self.max_attempts {
                        warn!(operation, attempts = attempt, "Rate limit persisted, giving up");
                        return Err(NextcloudError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.delay_for(attempt - 1, &error);
                    debug!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
