//! Retry executor with capped exponential backoff.
//!
//! `RetryPolicy` is immutable: attempt counters live on the stack of each
//! `execute` call, so one policy can wrap any number of concurrent
//! operations without interference.
//!
//! The delay before attempt `n` (n >= 2) is
//! `min(base_delay * 2^(n-2), max_delay)`, with no jitter.

use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use docflow_types::config::RetrySettings;
use docflow_types::error::ErrorClass;

// ---------------------------------------------------------------------------
// RetryClassify
// ---------------------------------------------------------------------------

/// How an error presents itself to the retry executor.
pub trait RetryClassify {
    /// The error family, checked against the policy's retryable set.
    fn class(&self) -> ErrorClass;

    /// An explicit per-error verdict. When `Some`, it replaces the
    /// class-based default entirely.
    fn retryable_override(&self) -> Option<bool> {
        None
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Error classes eligible for another attempt.
    pub retry_on: HashSet<ErrorClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            retry_on: ErrorClass::ALL.into_iter().collect(),
        }
    }

    /// Single attempt, never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }

    /// Restrict retries to the given error classes.
    pub fn with_retry_on(mut self, classes: impl IntoIterator<Item = ErrorClass>) -> Self {
        self.retry_on = classes.into_iter().collect();
        self
    }

    fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait before `attempt` (1-based). The first attempt has none.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let delay = 1u32
            .checked_shl(attempt - 2)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }

    /// Whether `error` qualifies for another attempt, ignoring the budget.
    pub fn should_retry<E: RetryClassify>(&self, error: &E) -> bool {
        match error.retryable_override() {
            Some(verdict) => verdict,
            None => self.retry_on.contains(&error.class()),
        }
    }

    /// Run `operation` until it succeeds, the error is not retryable, or
    /// the attempt budget is spent. The last error is returned as-is.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display,
    {
        let limit = self.attempt_limit();
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= limit || !self.should_retry(&error) {
                        return Err(error);
                    }
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = limit,
                        delay_ms = delay.as_millis() as u64,
                        error_class = %error.class(),
                        error = %error,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
