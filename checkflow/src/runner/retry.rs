//! Retry policy with configurable backoff and jitter.
//!
//! Attempts are numbered from 1. The delay scheduled after a failed
//! attempt `n` is derived from `n`, so the default linear strategy waits
//! `base × n` before attempt `n + 1`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{MAX_STAGE_ATTEMPTS, STAGE_RETRY_BACKOFF_MS};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * attempt
    #[default]
    Linear,
    /// delay = base * 2^(attempt - 1)
    Exponential,
    /// delay = base
    Constant,
}

/// Jitter applied on top of the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Exact delays.
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Retry configuration for a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub base_backoff_ms: u64,
    /// Optional cap on any single delay.
    pub max_backoff_ms: Option<u64>,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_STAGE_ATTEMPTS,
            base_backoff_ms: STAGE_RETRY_BACKOFF_MS,
            max_backoff_ms: None,
            backoff_strategy: BackoffStrategy::Linear,
            jitter_strategy: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_backoff_ms(mut self, delay: u64) -> Self {
        self.base_backoff_ms = delay;
        self
    }

    /// Caps individual delays.
    #[must_use]
    pub fn with_max_backoff_ms(mut self, delay: u64) -> Self {
        self.max_backoff_ms = Some(delay);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Returns true if another attempt is allowed after `attempt`.
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt `attempt` before the next one.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.base_backoff_ms;
        let attempt = attempt.max(1);

        let delay = match self.backoff_strategy {
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt - 1))
            }
            BackoffStrategy::Constant => base,
        };
        let delay = self.max_backoff_ms.map_or(delay, |cap| delay.min(cap));

        let jittered = match self.jitter_strategy {
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
}
