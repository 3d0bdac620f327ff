//! Reliability summary over a window of run events.

use serde::{Deserialize, Serialize};

use crate::core::{event_types, RunEvent};

/// Metadata key carrying a run's wall-clock runtime.
pub const RUNTIME_SECONDS_KEY: &str = "runtime_seconds";

/// Aggregate reliability figures for a set of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHealth {
    /// Runs started.
    pub run_count: usize,
    /// Runs that produced a report.
    pub run_completed: usize,
    /// Runs that ended on a required-stage failure.
    pub run_failed: usize,
    /// Runs aborted for insufficient success.
    pub run_aborted: usize,
    /// Failed stage attempts.
    pub stage_failed: usize,
    /// Scheduled stage retries.
    pub stage_retried: usize,
    /// Retries per failure, rounded to three decimals.
    pub retry_rate: f64,
    /// Mean runtime of finished runs.
    pub avg_runtime_seconds: Option<f64>,
    /// 95th percentile runtime of finished runs.
    pub p95_runtime_seconds: Option<f64>,
}

impl RunHealth {
    /// Summarizes `events`. Runtimes come from the `runtime_seconds`
    /// metadata of run-completed and run-failed events.
    #[must_use]
    pub fn from_events(events: &[RunEvent]) -> Self {
        let count = |event_type: &str| events.iter().filter(|e| e.event_type == event_type).count();

        let stage_failed = count(event_types::STAGE_FAILED);
        let stage_retried = count(event_types::STAGE_RETRY_SCHEDULED);

        let runtimes: Vec<f64> = events
            .iter()
            .filter(|e| {
                e.event_type == event_types::RUN_COMPLETED || e.event_type == event_types::RUN_FAILED
            })
            .filter_map(|e| e.metadata_value(RUNTIME_SECONDS_KEY)?.as_f64())
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect();

        let retry_rate = if stage_failed > 0 {
            round_to(stage_retried as f64 / stage_failed as f64, 3)
        } else {
            0.0
        };

        let avg_runtime_seconds = if runtimes.is_empty() {
            None
        } else {
            Some(round_to(runtimes.iter().sum::<f64>() / runtimes.len() as f64, 2))
        };

        Self {
            run_count: count(event_types::RUN_STARTED),
            run_completed: count(event_types::RUN_COMPLETED),
            run_failed: count(event_types::RUN_FAILED),
            run_aborted: count(event_types::RUN_ABORTED_INSUFFICIENT_SUCCESS),
            stage_failed,
            stage_retried,
            retry_rate,
            avg_runtime_seconds,
            p95_runtime_seconds: percentile(&runtimes, 95.0),
        }
    }
}

/// Nearest-rank percentile.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted.get(idx).copied()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
