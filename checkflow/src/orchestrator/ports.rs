//! Project status and run tracking ports.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::ProjectStatus;
use crate::errors::StoreError;
use crate::scoring::Recommendation;

/// Records the lifecycle status of a project.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectStatusPort: Send + Sync {
    /// Sets the project status.
    async fn set_status(&self, project_id: &str, status: ProjectStatus) -> Result<(), StoreError>;
}

/// What a run is about to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Agent stage keys in registry order.
    pub agents: Vec<String>,
    /// Whether a synthesis stage is configured.
    pub synthesis_enabled: bool,
    /// Attempts per stage.
    pub max_attempts: u32,
    /// Completed agent stages required to continue.
    pub min_required_successes: usize,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Wall-clock runtime.
    pub runtime_seconds: f64,
    /// Score per agent stage key, defaulted ones included.
    pub agent_scores: BTreeMap<String, f64>,
    /// Composite score.
    pub composite_score: f64,
    /// Final recommendation.
    pub recommendation: Recommendation,
    /// SHA-256 of the report markdown.
    pub report_markdown_hash: String,
    /// Agent stages that did not complete.
    pub failed_stages: Vec<String>,
}

/// Creates and completes pipeline run records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunTracker: Send + Sync {
    /// Opens a run and returns its identifier.
    async fn start_run(&self, project_id: &str, plan: &RunPlan) -> Result<String, StoreError>;

    /// Records the outcome of a run.
    async fn complete_run(&self, run_id: &str, summary: &RunSummary) -> Result<(), StoreError>;
}

/// Status port that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProjectStatus;

#[async_trait]
impl ProjectStatusPort for NoOpProjectStatus {
    async fn set_status(&self, _project_id: &str, _status: ProjectStatus) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Status port keeping every transition in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProjectStatus {
    history: Arc<Mutex<Vec<(String, ProjectStatus)>>>,
}

impl InMemoryProjectStatus {
    /// Creates an empty port.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest status of a project.
    #[must_use]
    pub fn current(&self, project_id: &str) -> Option<ProjectStatus> {
        self.history
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id == project_id)
            .map(|(_, status)| *status)
    }

    /// Every transition of a project, oldest first.
    #[must_use]
    pub fn history(&self, project_id: &str) -> Vec<ProjectStatus> {
        self.history
            .lock()
            .iter()
            .filter(|(id, _)| id == project_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

#[async_trait]
impl ProjectStatusPort for InMemoryProjectStatus {
    async fn set_status(&self, project_id: &str, status: ProjectStatus) -> Result<(), StoreError> {
        self.history.lock().push((project_id.to_string(), status));
        Ok(())
    }
}

/// Tracker that keeps runs in memory and hands out UUID run ids.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRunTracker {
    runs: Arc<Mutex<HashMap<String, (String, RunPlan, Option<RunSummary>)>>>,
}

impl InMemoryRunTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of a completed run.
    #[must_use]
    pub fn summary(&self, run_id: &str) -> Option<RunSummary> {
        self.runs.lock().get(run_id).and_then(|(_, _, s)| s.clone())
    }

    /// Number of runs started.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    /// Returns true if no run was started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }
}

#[async_trait]
impl RunTracker for InMemoryRunTracker {
    async fn start_run(&self, project_id: &str, plan: &RunPlan) -> Result<String, StoreError> {
        let run_id = Uuid::new_v4().to_string();
        self.runs
            .lock()
            .insert(run_id.clone(), (project_id.to_string(), plan.clone(), None));
        Ok(run_id)
    }

    async fn complete_run(&self, run_id: &str, summary: &RunSummary) -> Result<(), StoreError> {
        let mut runs = self.runs.lock();
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::backend(format!("unknown pipeline run {run_id}")))?;
        entry.2 = Some(summary.clone());
        Ok(())
    }
}
