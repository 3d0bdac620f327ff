//! Run event type for the append-only telemetry trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventLevel;

/// Event type names written to the telemetry trail.
pub mod event_types {
    /// A stage attempt began.
    pub const STAGE_STARTED: &str = "stage_started";
    /// A stage attempt succeeded.
    pub const STAGE_COMPLETED: &str = "stage_completed";
    /// A stage attempt failed.
    pub const STAGE_FAILED: &str = "stage_failed";
    /// A failed stage will be attempted again.
    pub const STAGE_RETRY_SCHEDULED: &str = "stage_retry_scheduled";
    /// A stage was restored from its checkpoint.
    pub const STAGE_SKIPPED: &str = "stage_skipped";
    /// An orchestrator run began.
    pub const RUN_STARTED: &str = "run_started";
    /// An orchestrator run produced a report.
    pub const RUN_COMPLETED: &str = "run_completed";
    /// An orchestrator run ended on a required-stage failure.
    pub const RUN_FAILED: &str = "run_failed";
    /// Too few stages completed to continue.
    pub const RUN_ABORTED_INSUFFICIENT_SUCCESS: &str = "run_aborted_insufficient_success";
    /// The optional synthesis stage produced nothing.
    pub const SYNTHESIS_UNAVAILABLE: &str = "synthesis_unavailable";
}

/// A single telemetry entry describing one state transition.
///
/// Events are created once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// The tracked pipeline run, when run tracking is available.
    pub pipeline_run_id: Option<String>,
    /// The project the run operates on.
    pub project_id: String,
    /// Event type (see [`event_types`]).
    pub event_type: String,
    /// The stage the event concerns, if any.
    pub stage_key: Option<String>,
    /// Severity.
    pub level: EventLevel,
    /// Human-readable message.
    pub message: String,
    /// Structured event data.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        event_type: impl Into<String>,
        level: EventLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_run_id: None,
            project_id: project_id.into(),
            event_type: event_type.into(),
            stage_key: None,
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Sets the pipeline run ID.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Option<&str>) -> Self {
        self.pipeline_run_id = run_id.map(ToString::to_string);
        self
    }

    /// Sets the stage key.
    #[must_use]
    pub fn with_stage(mut self, stage_key: impl Into<String>) -> Self {
        self.stage_key = Some(stage_key.into());
        self
    }

    /// Adds a metadata field.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a metadata field.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Returns true if the event is about the given stage.
    #[must_use]
    pub fn is_for_stage(&self, stage_key: &str) -> bool {
        self.stage_key.as_deref() == Some(stage_key)
    }
}
