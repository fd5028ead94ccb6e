//! Retry loop with a fixed or growing sleep between attempts.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    interval: Duration,
    max_interval: Option<Duration>,
    /// `None` retries forever.
    max_retries: Option<u64>,
}

impl BackoffPolicy {
    pub const fn constant(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: None,
            max_retries: None,
        }
    }

    /// Doubles the interval after every failed attempt, capped at `max`.
    pub const fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            interval: initial,
            max_interval: Some(max),
            max_retries: None,
        }
    }

    pub const fn with_max_retries(mut self, max_retries: Option<u64>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> Option<u64> {
        self.max_retries
    }

    /// Sleep before retry number `retry` (0 based).
    pub fn delay(&self, retry: u64) -> Duration {
        match self.max_interval {
            None => self.interval,
            Some(max) => {
                let factor = 1u32.checked_shl(retry.min(31) as u32).unwrap_or(u32::MAX);
                self.interval.saturating_mul(factor).min(max)
            }
        }
    }

    fn exhausted(&self, retries: u64) -> bool {
        matches!(self.max_retries, Some(max) if retries >= max)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The last error, once the retry budget is spent.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u64, last: E },
    /// The operation returned an error classified as not worth retrying.
    #[error(transparent)]
    Permanent(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Permanent(last) => last,
        }
    }
}

/// Runs `op` until it succeeds, returns an error `retryable` rejects, or the
/// policy runs out of retries. `max_retries = N` means up to `N + 1` calls.
///
/// Cancellation is left to the caller, the returned future can be raced in a
/// `select!` against a cancellation token.
pub async fn retry_if<T, E, F, Fut, R>(
    policy: &BackoffPolicy,
    mut op: F,
    retryable: R,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if !retryable(&e) => return Err(RetryError::Permanent(e)),
            Err(e) if policy.exhausted(retries) => {
                return Err(RetryError::Exhausted {
                    attempts: retries + 1,
                    last: e,
                })
            }
            Err(e) => {
                let delay = policy.delay(retries);
                debug!(retry = retries + 1, ?delay, "Retrying after error: {e}");
                tokio::time::sleep(delay).await;
                retries += 1;
            }
        }
    }
}

/// [`retry_if`] retrying every error.
pub async fn retry<T, E, F, Fut>(policy: &BackoffPolicy, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_if(policy, op, |_| true).await
}
