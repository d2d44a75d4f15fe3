//! Bounded exponential backoff for fallible async operations.
//!
//! Every failure is treated as transient: the retrier never looks at the error
//! beyond logging it. Callers that need to stop early on a permanent failure must
//! not wrap that call.

use std::fmt::Display;
use std::future::Future;
use tokio::time::{Duration, sleep};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
#[error("operation failed after {attempts} attempts: {last_error}")]
pub struct RetriesExhausted<E> {
    pub attempts: u32,
    #[source]
    pub last_error: E,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so at most `max_retries + 1` calls are made.
    pub max_retries: u32,
    /// Unit of the backoff. The wait after failed attempt `k` is `base_delay * 2^k`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        RetryPolicy {
            max_retries,
            base_delay,
        }
    }

    /// Delay to wait after the given failed attempt (counted from 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.checked_pow(attempt).unwrap_or(u32::MAX))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Runs `op` until it succeeds or the attempts are used up.
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetriesExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(last_error) if attempt >= self.max_attempts() => {
                    tracing::error!(
                        attempts = attempt,
                        error = %last_error,
                        "Retries exhausted"
                    );
                    return Err(RetriesExhausted {
                        attempts: attempt,
                        last_error,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        error = %e,
                        "Error encountered, retrying in {:.1} seconds",
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
