//! Pipeline configuration.
//!
//! Defaults are named constants because report language quotes them.
//! [`PipelineSettings::from_env`] lets deployments override them without
//! a rebuild.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::runner::RetryPolicy;

/// Attempts a stage gets before it is considered exhausted.
pub const MAX_STAGE_ATTEMPTS: u32 = 2;

/// Base delay between attempts; attempt `n` waits `n` times this.
pub const STAGE_RETRY_BACKOFF_MS: u64 = 2000;

/// Environment variable overriding [`MAX_STAGE_ATTEMPTS`].
pub const ENV_MAX_STAGE_ATTEMPTS: &str = "CHECKFLOW_STAGE_MAX_ATTEMPTS";

/// Environment variable overriding [`STAGE_RETRY_BACKOFF_MS`].
pub const ENV_STAGE_RETRY_BACKOFF_MS: &str = "CHECKFLOW_STAGE_RETRY_BACKOFF_MS";

/// Environment variable overriding the success threshold.
pub const ENV_MIN_REQUIRED_SUCCESSES: &str = "CHECKFLOW_MIN_REQUIRED_SUCCESSES";

/// Settings shared by every stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Retry behavior for every stage.
    pub retry: RetryPolicy,
    /// Minimum completed fan-out stages. `None` means a strict majority.
    pub min_required_successes: Option<usize>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            min_required_successes: None,
        }
    }
}

impl PipelineSettings {
    /// Creates settings with the documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets an explicit success threshold.
    #[must_use]
    pub fn with_min_required_successes(mut self, required: usize) -> Self {
        self.min_required_successes = Some(required);
        self
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, falling back to defaults for
    /// absent keys. Attempts are clamped to at least one.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup(ENV_MAX_STAGE_ATTEMPTS) {
            let attempts: i64 = parse_var(ENV_MAX_STAGE_ATTEMPTS, &raw)?;
            settings.retry.max_attempts = u32::try_from(attempts.max(1)).unwrap_or(u32::MAX);
        }

        if let Some(raw) = lookup(ENV_STAGE_RETRY_BACKOFF_MS) {
            let backoff: i64 = parse_var(ENV_STAGE_RETRY_BACKOFF_MS, &raw)?;
            settings.retry.base_backoff_ms = u64::try_from(backoff.max(0)).unwrap_or(0);
        }

        if let Some(raw) = lookup(ENV_MIN_REQUIRED_SUCCESSES) {
            settings.min_required_successes = Some(parse_var(ENV_MIN_REQUIRED_SUCCESSES, &raw)?);
        }

        Ok(settings)
    }

    /// Resolves the success threshold for `total` registered stages.
    pub fn required_successes(&self, total: usize) -> Result<usize, ConfigError> {
        let required = self.min_required_successes.unwrap_or(total / 2 + 1);
        if required > total {
            return Err(ConfigError::UnreachableThreshold { required, total });
        }
        Ok(required)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
