//! The persisted checkpoint record and its write transitions.
//!
//! Transitions are pure functions of the existing record so the merge
//! rules (completed is terminal, attempts never decrease, failures keep
//! earlier payloads) can be tested without a backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::CheckpointStatus;

/// Durable status of one stage for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCheckpoint {
    /// Owning project.
    pub project_id: String,
    /// Stage key, unique within a project.
    pub stage_key: String,
    /// Current status.
    pub status: CheckpointStatus,
    /// Opaque result cache written on completion.
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
    /// When the most recent attempt began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage last completed or failed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Duration of the last finished attempt.
    pub duration_ms: Option<u64>,
    /// Highest attempt number ever recorded.
    pub attempts: u32,
    /// Message of the last failure; cleared on start and completion.
    pub error: Option<String>,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Outcome of a `mark_started` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMark {
    /// The checkpoint now reads `in_progress`.
    Started,
    /// The checkpoint was already completed and was left untouched.
    AlreadyCompleted,
}

impl StageCheckpoint {
    /// Creates a pending record.
    #[must_use]
    pub fn pending(project_id: impl Into<String>, stage_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            stage_key: stage_key.into(),
            status: CheckpointStatus::Pending,
            payload: empty_payload(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            attempts: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Record for a started attempt, or `None` when `existing` is completed.
    #[must_use]
    pub fn started(
        existing: Option<&Self>,
        project_id: &str,
        stage_key: &str,
        attempt: u32,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if existing.is_some_and(|e| e.status.is_terminal()) {
            return None;
        }

        let base = existing
            .cloned()
            .unwrap_or_else(|| Self::pending(project_id, stage_key));

        Some(Self {
            status: CheckpointStatus::InProgress,
            started_at: Some(now),
            completed_at: None,
            duration_ms: None,
            attempts: base.attempts.max(attempt),
            error: None,
            updated_at: now,
            ..base
        })
    }

    /// Record for a completed stage.
    #[must_use]
    pub fn completed(
        existing: Option<&Self>,
        project_id: &str,
        stage_key: &str,
        payload: serde_json::Value,
        duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let base = existing
            .cloned()
            .unwrap_or_else(|| Self::pending(project_id, stage_key));

        Self {
            status: CheckpointStatus::Completed,
            payload: if payload.is_null() { empty_payload() } else { payload },
            started_at: base.started_at.or(Some(now)),
            completed_at: Some(now),
            duration_ms: Some(duration_ms),
            attempts: base.attempts.max(1),
            error: None,
            updated_at: now,
            ..base
        }
    }

    /// Record for a failed attempt. Any earlier payload is preserved.
    #[must_use]
    pub fn failed(
        existing: Option<&Self>,
        project_id: &str,
        stage_key: &str,
        error: &str,
        duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let base = existing
            .cloned()
            .unwrap_or_else(|| Self::pending(project_id, stage_key));

        Self {
            status: CheckpointStatus::Failed,
            started_at: base.started_at.or(Some(now)),
            completed_at: Some(now),
            duration_ms: Some(duration_ms),
            attempts: base.attempts.max(1),
            error: Some(error.to_string()),
            updated_at: now,
            ..base
        }
    }

    /// Returns true if the payload holds something besides an empty object.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        match &self.payload {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }
}
