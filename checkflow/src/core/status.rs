//! Checkpoint, event-level and project status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The persisted status of a stage checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// No attempt has started yet.
    #[default]
    Pending,
    /// An attempt is running (or the process died while it was).
    InProgress,
    /// The stage finished and its payload is usable.
    Completed,
    /// The most recent attempt failed.
    Failed,
    /// The stage was deliberately not run.
    Skipped,
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl CheckpointStatus {
    /// Returns true if no later write may change the status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the stage can be skipped on resume.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Severity of a telemetry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal transitions.
    #[default]
    Info,
    /// Degraded but recoverable.
    Warn,
    /// A failure that matters to the run.
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Lifecycle status of a project as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// The pipeline is running.
    Researching,
    /// The pipeline finished and the report awaits review.
    Review,
    /// The pipeline ended in a terminal failure.
    Error,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Researching => write!(f, "researching"),
            Self::Review => write!(f, "review"),
            Self::Error => write!(f, "error"),
        }
    }
}
