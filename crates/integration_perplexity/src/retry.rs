//! Bounded retry with exponential backoff
//!
//! The delay schedule is a pure function of the attempt number. Waiting goes
//! through a [`Sleeper`] so tests can observe the schedule without sleeping.
//!
//! # Example
//!
//! ```rust,ignore
//! use integration_perplexity::retry::{RetryPolicy, TokioSleeper, with_retry};
//!
//! let policy = RetryPolicy::default();
//! let outcome = with_retry(&policy, &TokioSleeper, |attempt| async move {
//!     call_provider(attempt).await
//! })
//! .await;
//! ```

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Hard ceiling on attempts per logical call
pub const MAX_ATTEMPTS_CAP: u32 = 3;

/// Retry schedule for provider calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds (default: 1000ms)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay in milliseconds (default: 8000ms)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

const fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS_CAP
}

const fn default_initial_delay() -> u64 {
    1000
}

const fn default_max_delay() -> u64 {
    8000
}

const fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom parameters
    #[must_use]
    pub const fn new(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        }
    }

    /// Millisecond-scale policy for tests
    #[must_use]
    pub const fn fast() -> Self {
        Self::new(MAX_ATTEMPTS_CAP, 10, 40, 2.0)
    }

    /// Delay to wait after the given failed attempt (1-indexed)
    ///
    /// `delay = initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let base_delay = (self.initial_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64).max(0.0);

        Duration::from_millis(capped_delay as u64)
    }

    /// Validate the policy
    ///
    /// # Errors
    ///
    /// Returns an error if the policy could block unboundedly or is nonsensical.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_CAP {
            return Err(format!(
                "max_attempts must be between 1 and {MAX_ATTEMPTS_CAP}"
            ));
        }

        if self.multiplier < 1.0 {
            return Err("multiplier must be at least 1.0".to_string());
        }

        if self.initial_delay_ms > self.max_delay_ms {
            return Err("initial_delay_ms must not exceed max_delay_ms".to_string());
        }

        Ok(())
    }
}

/// Errors that can be checked for retryability
pub trait Retryable {
    /// Returns true if another attempt may succeed
    fn is_retryable(&self) -> bool;
}

/// Source of delays between attempts
#[async_trait]
pub trait Sleeper: Send + Sync + fmt::Debug {
    /// Wait for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that records requested delays and returns immediately
///
/// Intended for tests that need to observe the backoff schedule.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

/// Outcome of a retried operation
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The result of the last attempt
    pub result: Result<T, E>,
    /// Number of attempts made (1 = no retries)
    pub attempts: u32,
    /// Total time spent including delays
    pub total_duration: Duration,
}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent
///
/// The closure receives the 1-indexed attempt number.
#[allow(clippy::cast_possible_truncation)]
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.clamp(1, MAX_ATTEMPTS_CAP);
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation(attempts).await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(
                        attempts = attempts,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Operation succeeded after retries"
                    );
                }
                return RetryResult {
                    result: Ok(value),
                    attempts,
                    total_duration: start.elapsed(),
                };
            },
            Err(err) => {
                if !err.is_retryable() {
                    debug!(
                        attempts = attempts,
                        error = %err,
                        "Operation failed with non-retryable error"
                    );
                    return RetryResult {
                        result: Err(err),
                        attempts,
                        total_duration: start.elapsed(),
                    };
                }

                if attempts >= max_attempts {
                    warn!(
                        attempts = attempts,
                        error = %err,
                        "Operation failed after max attempts"
                    );
                    return RetryResult {
                        result: Err(err),
                        attempts,
                        total_duration: start.elapsed(),
                    };
                }

                let delay = policy.delay_for_attempt(attempts);
                warn!(
                    attempt = attempts,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );

                sleeper.sleep(delay).await;
            },
        }
    }
}
