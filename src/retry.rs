//! Retry and backoff shared by the collector and the batch resolver.
//!
//! Rate limits are waited out and the identical request is re-sent; they
//! never count against the retry budget. Transient failures back off
//! exponentially until the budget is spent. Permanent failures return at
//! once.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Retries after the first transient failure of one request.
    pub max_retries: u32,
    #[serde(rename = "initial_backoff_ms", deserialize_with = "millis")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms", deserialize_with = "millis")]
    pub max_backoff: Duration,
    pub multiplier: u32,
    /// Used when a rate limited response does not say how long to wait.
    #[serde(rename = "rate_limit_wait_ms", deserialize_with = "millis")]
    pub rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2,
            // the upstream rate limit window
            rate_limit_wait: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exp);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

fn millis<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    u64::deserialize(de).map(Duration::from_millis)
}

/// Shared cancellation flag, checked between upstream calls.
///
/// Cancelling also wakes any [`ThreadSleeper`] currently waiting on it.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks for up to `timeout`, returning early with `true` once cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .inner
            .wake
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// How the retry loop suspends between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken);
}

impl<S: Sleeper + ?Sized> Sleeper for Arc<S> {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        (**self).sleep(duration, cancel)
    }
}

/// Blocks the calling thread; wakes early on cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        cancel.wait_timeout(duration);
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, _cancel: &CancelToken) {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

#[derive(Debug)]
pub(crate) enum RetryFailure {
    Exhausted { attempts: u32, cause: FetchError },
    Permanent(FetchError),
    Cancelled,
}

/// Runs `op` until it succeeds or the policy gives up.
pub(crate) fn run<T, S, F>(
    policy: &RetryPolicy,
    sleeper: &S,
    cancel: &CancelToken,
    mut op: F,
) -> Result<T, RetryFailure>
where
    S: Sleeper + ?Sized,
    F: FnMut() -> Result<T, FetchError>,
{
    let mut failures = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryFailure::Cancelled);
        }
        match op() {
            Ok(value) => return Ok(value),
            Err(FetchError::RateLimited { retry_after }) => {
                let wait = retry_after.unwrap_or(policy.rate_limit_wait);
                warn!(?wait, "rate limited, waiting before resending");
                sleeper.sleep(wait, cancel);
            }
            Err(cause @ FetchError::Transient { .. }) => {
                failures += 1;
                if failures > policy.max_retries {
                    warn!(attempts = failures, %cause, "retries exhausted");
                    return Err(RetryFailure::Exhausted {
                        attempts: failures,
                        cause,
                    });
                }
                let delay = policy.backoff_for(failures);
                debug!(retry = failures, ?delay, %cause, "transient failure, backing off");
                sleeper.sleep(delay, cancel);
            }
            Err(cause @ FetchError::Permanent { .. }) => {
                return Err(RetryFailure::Permanent(cause));
            }
        }
    }
}
