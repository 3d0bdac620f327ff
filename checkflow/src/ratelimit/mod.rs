//! Minimum-interval rate limiting for outbound collaborator requests.
//!
//! Each client owns its own [`RateLimiter`]; there is no process-wide
//! limiter state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default spacing between requests.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1000;

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether requests are spaced at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Minimum milliseconds between the starts of two requests.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_min_interval_ms() -> u64 {
    DEFAULT_MIN_INTERVAL_MS
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

/// Spaces request starts at least `min_interval` apart.
///
/// Clones share state. Waiters are served in lock order, so concurrent
/// callers are spaced one interval apart from each other as well.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// Creates a limiter with the given spacing.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a limiter from configuration. A disabled config yields a
    /// zero interval.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        if config.enabled {
            Self::new(Duration::from_millis(config.min_interval_ms))
        } else {
            Self::new(Duration::ZERO)
        }
    }

    /// Configured spacing.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until a request may start, then records the start.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                let wait = ready_at - now;
                let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
                debug!(wait_ms, "Rate limited; waiting");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Waits for a slot, then runs `request`.
    pub async fn run<F, Fut, T>(&self, request: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        self.acquire().await;
        request().await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
