//! Bounded retry with a fixed interval.
//!
//! # Retry Policy
//!
//! - Retries: 9 by default (10 total attempts)
//! - Interval: 333ms between attempts, no backoff, no jitter
//!
//! Exhaustion is reported as [`RetryOutcome::Exhausted`], not as an error:
//! the caller decides whether running out of attempts is fatal.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use kiln_config::IdeConfig;

/// Boxed future borrowing the retried state.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the first attempt).
    pub retries: u32,
    /// Delay before each retry.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 9,
            interval: Duration::from_millis(333),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &IdeConfig) -> Self {
        Self {
            retries: config.retries,
            interval: config.retry_interval(),
        }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Outcome of a retry operation.
///
/// Structurally distinguishes success from running out of attempts.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success(T),
    Exhausted { attempts: u32, last_error: E },
}

impl<T, E> RetryOutcome<T, E> {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

/// Run `attempt` against `state` until it succeeds or the policy runs out.
///
/// `attempt` receives the 1-based attempt number. Sleeps `policy.interval`
/// between attempts, never after the last one.
pub async fn retry<S, T, E, F>(
    policy: RetryPolicy,
    state: &mut S,
    mut attempt: F,
) -> RetryOutcome<T, E>
where
    F: for<'s> FnMut(&'s mut S, u32) -> BoxFuture<'s, Result<T, E>>,
    E: Display,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt(state, attempts).await {
            Ok(value) => return RetryOutcome::Success(value),
            Err(last_error) if attempts >= policy.max_attempts() => {
                return RetryOutcome::Exhausted {
                    attempts,
                    last_error,
                };
            }
            Err(e) => {
                tracing::debug!(attempt = attempts, "attempt failed, retrying: {e}");
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}
