//! Retry with exponential backoff.
//!
//! `RetryState` tracks attempts and the last error and decides whether another
//! attempt is allowed. Waiting goes through a [`Sleeper`] so callers (and
//! tests) control how delays are spent.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Wait after the failed zero-based `attempt`: `2^attempt + 1` seconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt).saturating_add(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision<E> {
    Retry { delay: Duration },
    /// No attempts left; carries the final error.
    GiveUp { last_error: E },
}

#[derive(Debug)]
pub struct RetryState<E> {
    policy: RetryPolicy,
    attempts: u32,
    last_error: Option<E>,
}

impl<E> RetryState<E> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempts: 0, last_error: None }
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    /// Record a failed attempt and decide what happens next.
    pub fn record_failure(&mut self, error: E) -> RetryDecision<E> {
        let failed_attempt = self.attempts;
        self.attempts += 1;

        if self.attempts < self.policy.max_attempts.max(1) {
            self.last_error = Some(error);
            RetryDecision::Retry { delay: self.policy.delay_for(failed_attempt) }
        } else {
            self.last_error = None;
            RetryDecision::GiveUp { last_error: error }
        }
    }
}

/// Source of delays between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// All attempts failed.
#[derive(Debug)]
pub struct RetriesExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` until it succeeds or the policy gives up. `op` receives the
/// zero-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, RetriesExhausted<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut state = RetryState::new(policy);
    loop {
        let attempt = state.attempts();
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let message = e.to_string();
                match state.record_failure(e) {
                    RetryDecision::Retry { delay } => {
                        warn!(
                            attempt = attempt + 1,
                            delay_secs = delay.as_secs(),
                            error = %message,
                            "Attempt failed, retrying"
                        );
                        sleeper.sleep(delay).await;
                    }
                    RetryDecision::GiveUp { last_error } => {
                        return Err(RetriesExhausted { attempts: state.attempts(), last_error });
                    }
                }
            }
        }
    }
}
