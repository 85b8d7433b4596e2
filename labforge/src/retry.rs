//! Bounded retry with delay, backoff, and an overall deadline.
//!
//! Every network-facing call in the build path goes through [`RetryPolicy::run`]
//! so retry behavior is decided in one place; call sites differ only in the
//! attempt budget, delay, and deadline they configure. The operation closure
//! reports a per-attempt verdict ([`Attempt`]) rather than raising: `Retry`
//! consumes an attempt, `Fail` aborts immediately for errors that no amount
//! of retrying will fix.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Per-attempt verdict returned by the operation closure.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The operation succeeded with this value; the loop stops.
    Done(T),
    /// Transient failure; consume an attempt and try again.
    Retry,
    /// Permanent failure; abort without consuming the remaining attempts.
    Fail(E),
}

/// Terminal failure of a retry loop.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt was consumed without a success.
    #[error("gave up after {attempts} attempts ({elapsed:.1?} elapsed)")]
    Exhausted {
        /// Attempts actually executed.
        attempts: u32,
        /// Wall-clock time spent in the loop.
        elapsed: Duration,
    },
    /// The overall deadline passed before any attempt succeeded.
    #[error("timed out after {attempts} attempts ({elapsed:.1?} elapsed)")]
    TimedOut {
        /// Attempts actually executed.
        attempts: u32,
        /// Wall-clock time spent in the loop.
        elapsed: Duration,
    },
    /// The operation reported a permanent failure.
    #[error("{0}")]
    Aborted(E),
}

impl<E> RetryError<E> {
    /// Number of attempts the loop executed before failing, where known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::TimedOut { attempts, .. } => {
                Some(*attempts)
            }
            RetryError::Aborted(_) => None,
        }
    }
}

/// Attempt budget, pacing, and deadline for one retry loop.
///
/// # Example
///
/// ```ignore
/// use labforge::retry::{Attempt, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(10)
///     .with_delay(Duration::from_secs(5))
///     .with_backoff(1.5);
/// let server = policy
///     .run(|_| async { ... })
///     .await?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    timeout: Option<Duration>,
    delay: Option<Duration>,
    backoff: f64,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget, no delay between
    /// attempts, no backoff, and no overall deadline.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            timeout: None,
            delay: None,
            backoff: 1.0,
        }
    }

    /// Sets an overall deadline. Once it passes, no further attempt runs.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the pause between attempts. Applied after a failed attempt,
    /// never before the first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the multiplier applied to the delay after each pause.
    pub fn with_backoff(mut self, backoff: f64) -> Self {
        debug_assert!(backoff >= 1.0, "backoff must not shrink the delay");
        self.backoff = backoff;
        self
    }

    /// Maximum number of attempts this policy allows.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs `operation` until it reports `Done`, the attempt budget is
    /// spent, or the deadline passes.
    ///
    /// The closure receives the 1-based attempt number. The delay is slept
    /// between attempts and multiplied by the backoff factor after each
    /// sleep; the deadline is checked after every attempt and again after
    /// every sleep, so an attempt never starts past the deadline.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let start = Instant::now();
        let mut delay = self.delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation(attempt).await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fail(error) => return Err(RetryError::Aborted(error)),
                Attempt::Retry => {}
            }

            if attempt >= self.attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    elapsed: start.elapsed(),
                });
            }
            if self.deadline_passed(start) {
                return Err(RetryError::TimedOut {
                    attempts: attempt,
                    elapsed: start.elapsed(),
                });
            }

            if let Some(pause) = delay {
                tokio::time::sleep(pause).await;
                delay = Some(pause.mul_f64(self.backoff));
                if self.deadline_passed(start) {
                    return Err(RetryError::TimedOut {
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    });
                }
            }
        }
    }

    fn deadline_passed(&self, start: Instant) -> bool {
        self.timeout.map_or(false, |limit| start.elapsed() >= limit)
    }
}
