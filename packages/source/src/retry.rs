//! Exponential-backoff retry for any fallible async operation.
//!
//! ```ignore
//! let policy = RetryPolicy::new(3, Duration::from_secs(120), Duration::from_secs(900));
//!
//! // Retry every failure
//! let value = policy.run("load", || async { do_work().await }).await?;
//!
//! // Retry only failures the predicate accepts
//! let body = policy
//!     .run_if("fetch Oslo", || async { client.get().await }, SourceError::is_transient)
//!     .await?;
//! ```
//!
//! With the default policy (3 retries, 2 min initial delay, 15 min cap)
//! the waits are 2, 4 and 8 minutes: four attempts in total.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry ceiling and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

/// The error of the last attempt, once no further retry will be made.
#[derive(Debug)]
pub struct RetryError<E> {
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Error returned by the last attempt.
    pub source: E,
}

impl<E> RetryError<E> {
    /// Discards the attempt count.
    pub fn into_inner(self) -> E {
        self.source
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Returns the delay before retry number `retry` (1-based): the
    /// initial delay doubled `retry - 1` times, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op`, retrying every failure until it succeeds or the retry
    /// ceiling is reached.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error wrapped in [`RetryError`].
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(label, op, |_| true).await
    }

    /// Runs `op`, retrying failures for which `should_retry` returns
    /// `true` until it succeeds or the retry ceiling is reached.
    ///
    /// # Errors
    ///
    /// Returns the error of the first non-retryable failure, or of the
    /// last attempt, wrapped in [`RetryError`].
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut op: F,
        should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{label}: succeeded on attempt {attempt}");
                    }
                    return Ok(value);
                }
                Err(e) if !should_retry(&e) => {
                    log::error!("{label}: permanent failure on attempt {attempt}: {e}");
                    return Err(RetryError {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) if attempt > self.max_retries => {
                    log::error!(
                        "{label}: giving up after {attempt} attempt(s), last error: {e}"
                    );
                    return Err(RetryError {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "{label}: attempt {attempt} failed: {e}; retry {attempt}/{} in {delay:?}",
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
