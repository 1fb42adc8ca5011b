//! Retry policy for calls to external stage collaborators.
//!
//! Attempt `i` (0-indexed) that fails with a retryable error waits
//! [`RetryConfig::delay_for`]`(i)` before the next attempt. No sleep follows
//! the final attempt.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::errors::{ClauseflowError, ConfigError};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = initial * base^attempt
    #[default]
    Exponential,
    /// delay = initial * (attempt + 1)
    Linear,
    /// delay = initial
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    pub max_attempts: usize,
    /// Delay after the first failed attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub exp_base: u32,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            exp_base: 7,
            max_delay_ms: 60_000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates the default retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay_ms(mut self, delay: u64) -> Self {
        self.initial_delay_ms = delay;
        self
    }

    /// Sets the exponential base.
    #[must_use]
    pub fn with_exp_base(mut self, base: u32) -> Self {
        self.exp_base = base;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Delay to wait after the failed attempt `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let initial = self.initial_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff {
            BackoffStrategy::Exponential => {
                let exp = u32::try_from(attempt).unwrap_or(u32::MAX);
                let factor = u64::from(self.exp_base).saturating_pow(exp);
                initial.saturating_mul(factor).min(max)
            }
            BackoffStrategy::Linear => {
                let steps = u64::try_from(attempt).unwrap_or(u64::MAX).saturating_add(1);
                initial.saturating_mul(steps).min(max)
            }
            BackoffStrategy::Constant => initial.min(max),
        };

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }

    /// Checks the config for values that would make retry meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.backoff == BackoffStrategy::Exponential && self.exp_base == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.exp_base",
                reason: "must be at least 1 for exponential backoff".to_string(),
            });
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.initial_delay_ms",
                reason: format!(
                    "{} exceeds max_delay_ms {}",
                    self.initial_delay_ms, self.max_delay_ms
                ),
            });
        }
        Ok(())
    }
}

/// Classifies errors as eligible for retry.
pub trait Retryable {
    /// Returns true if another attempt may succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for ClauseflowError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientExternal(_) | Self::Timeout(_))
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more attempts left.
    GiveUp,
    /// The error is not retryable.
    NotRetryable,
}

/// Decides what to do after attempt `attempt` (0-indexed) failed with `error`.
#[must_use]
pub fn should_retry<E: Retryable>(config: &RetryConfig, attempt: usize, error: &E) -> RetryDecision {
    if !error.is_retryable() {
        return RetryDecision::NotRetryable;
    }
    if attempt + 1 >= config.max_attempts {
        return RetryDecision::GiveUp;
    }
    RetryDecision::Retry(config.delay_for(attempt))
}

/// Result of [`with_retry`] plus the number of attempts made.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result.
    pub result: Result<T, E>,
    /// Attempts made, at least 1.
    pub attempts: usize,
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts `config.max_attempts`. The last error is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    key: &str,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                }
            }
            Err(e) => match should_retry(config, attempt, &e) {
                RetryDecision::Retry(delay) => {
                    tracing::debug!(
                        key,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    tracing::warn!(key, attempts = attempt + 1, error = %e, "Retries exhausted");
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt + 1,
                    };
                }
                RetryDecision::NotRetryable => {
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt + 1,
                    };
                }
            },
        }
    }
}
