//! Span constructors and a stage timer.
//!
//! Every runner and orchestrator log line is emitted inside one of these
//! spans, so a JSON log stream can be filtered by run or by stage.

use tokio::time::Instant;
use tracing::Span;

/// Span covering one orchestrator run.
#[must_use]
pub fn run_span(project_id: &str, pipeline_run_id: Option<&str>) -> Span {
    tracing::info_span!(
        "pipeline_run",
        project_id = project_id,
        pipeline_run_id = pipeline_run_id.unwrap_or("untracked"),
    )
}

/// Span covering every attempt of one stage.
#[must_use]
pub fn stage_span(project_id: &str, stage_key: &str, label: &str) -> Span {
    tracing::info_span!(
        "stage",
        project_id = project_id,
        stage_key = stage_key,
        label = label,
    )
}

/// Wall-clock timer for a stage attempt.
///
/// Reads the tokio clock so paused-time tests observe virtual durations.
#[derive(Debug, Clone, Copy)]
pub struct StageTimer {
    start: Instant,
}

impl StageTimer {
    /// Starts a timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Elapsed seconds, rounded to two decimals.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        (self.start.elapsed().as_secs_f64() * 100.0).round() / 100.0
    }
}
