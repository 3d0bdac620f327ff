//! Queued orchestration runs.
//!
//! A [`RunQueue`] holds at most one active job per order. Workers call
//! [`process_next_run_job`], which claims the oldest queued job with a
//! compare-and-set and drives the orchestrator for it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::orchestrator::{Orchestrator, ProjectContext};

/// Requester recorded when none is given.
pub const DEFAULT_REQUESTER: &str = "admin";

/// Lifecycle of a queued run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunJobStatus {
    /// Waiting for a worker.
    Queued,
    /// Claimed by a worker.
    Running,
    /// The run finished.
    Completed,
    /// The run errored.
    Failed,
}

impl RunJobStatus {
    /// Returns true for queued and running jobs.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

/// A request to run the pipeline for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunJob {
    /// Job id.
    pub id: String,
    /// Order the run was requested for.
    pub order_id: String,
    /// Project the run executes against.
    pub project_id: String,
    /// Context handed to the orchestrator.
    pub context: ProjectContext,
    /// Current status.
    pub status: RunJobStatus,
    /// Who asked for the run.
    pub requested_by: String,
    /// Number of claims so far.
    pub attempts: u32,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the latest claim happened.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed or failed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure message of the latest run.
    pub error_message: Option<String>,
}

/// Parameters for [`RunQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunJobRequest {
    /// Order id.
    pub order_id: String,
    /// Project id.
    pub project_id: String,
    /// Project context.
    pub context: ProjectContext,
    /// Requester, [`DEFAULT_REQUESTER`] when absent.
    pub requested_by: Option<String>,
}

impl RunJobRequest {
    /// Creates a request with the default requester.
    #[must_use]
    pub fn new(order_id: impl Into<String>, project_id: impl Into<String>, context: ProjectContext) -> Self {
        Self {
            order_id: order_id.into(),
            project_id: project_id.into(),
            context,
            requested_by: None,
        }
    }

    /// Sets the requester.
    #[must_use]
    pub fn requested_by(mut self, requester: impl Into<String>) -> Self {
        self.requested_by = Some(requester.into());
        self
    }
}

/// Result of [`RunQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enqueued {
    /// The new job, or the order's job that was already active.
    pub job: RunJob,
    /// True if no job was inserted.
    pub already_active: bool,
}

/// Durable queue of run jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunQueue: Send + Sync {
    /// Inserts a queued job unless the order already has an active one.
    async fn enqueue(&self, request: RunJobRequest) -> Result<Enqueued, StoreError>;

    /// Oldest queued job.
    async fn next_queued(&self) -> Result<Option<RunJob>, StoreError>;

    /// Moves a job from queued to running and bumps its attempts.
    ///
    /// Returns `None` if the job is no longer queued.
    async fn claim(&self, job_id: &str) -> Result<Option<RunJob>, StoreError>;

    /// Marks a job completed and clears its error.
    async fn complete(&self, job_id: &str) -> Result<(), StoreError>;

    /// Marks a job failed with `message`.
    async fn fail(&self, job_id: &str, message: &str) -> Result<(), StoreError>;
}

/// Queue kept in memory, in enqueue order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRunQueue {
    jobs: Arc<Mutex<Vec<RunJob>>>,
}

impl InMemoryRunQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a job.
    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<RunJob> {
        self.jobs.lock().iter().find(|job| job.id == job_id).cloned()
    }

    /// Every job, oldest first.
    #[must_use]
    pub fn jobs(&self) -> Vec<RunJob> {
        self.jobs.lock().clone()
    }

    fn finish(
        &self,
        job_id: &str,
        status: RunJobStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or_else(|| StoreError::backend(format!("unknown run job {job_id}")))?;
        job.status = status;
        job.completed_at = Some(Utc::now());
        job.error_message = error_message;
        Ok(())
    }
}

#[async_trait]
impl RunQueue for InMemoryRunQueue {
    async fn enqueue(&self, request: RunJobRequest) -> Result<Enqueued, StoreError> {
        let mut jobs = self.jobs.lock();
        if let Some(active) = jobs
            .iter()
            .rev()
            .find(|job| job.order_id == request.order_id && job.status.is_active())
        {
            return Ok(Enqueued {
                job: active.clone(),
                already_active: true,
            });
        }

        let job = RunJob {
            id: Uuid::new_v4().to_string(),
            order_id: request.order_id,
            project_id: request.project_id,
            context: request.context,
            status: RunJobStatus::Queued,
            requested_by: request
                .requested_by
                .unwrap_or_else(|| DEFAULT_REQUESTER.to_string()),
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        };
        jobs.push(job.clone());
        Ok(Enqueued {
            job,
            already_active: false,
        })
    }

    async fn next_queued(&self) -> Result<Option<RunJob>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .iter()
            .find(|job| job.status == RunJobStatus::Queued)
            .cloned())
    }

    async fn claim(&self, job_id: &str) -> Result<Option<RunJob>, StoreError> {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs
            .iter_mut()
            .find(|job| job.id == job_id && job.status == RunJobStatus::Queued)
        else {
            return Ok(None);
        };
        job.status = RunJobStatus::Running;
        job.attempts += 1;
        job.started_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn complete(&self, job_id: &str) -> Result<(), StoreError> {
        self.finish(job_id, RunJobStatus::Completed, None)
    }

    async fn fail(&self, job_id: &str, message: &str) -> Result<(), StoreError> {
        self.finish(job_id, RunJobStatus::Failed, Some(message.to_string()))
    }
}

/// What [`process_next_run_job`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Nothing was queued.
    NoQueuedJobs,
    /// Another worker claimed the job first.
    ClaimLost,
    /// The job ran to completion.
    Completed {
        /// Job id.
        job_id: String,
    },
    /// The run errored and the job was marked failed.
    Failed {
        /// Job id.
        job_id: String,
        /// The run error.
        error: String,
    },
}

/// Claims the oldest queued job and runs the orchestrator for it.
///
/// A failed run is recorded on the job, not returned as an error.
///
/// # Errors
///
/// Returns queue errors.
pub async fn process_next_run_job(
    queue: &dyn RunQueue,
    orchestrator: &Orchestrator,
) -> Result<ProcessOutcome, StoreError> {
    let Some(next) = queue.next_queued().await? else {
        debug!("No queued run jobs");
        return Ok(ProcessOutcome::NoQueuedJobs);
    };

    let Some(job) = queue.claim(&next.id).await? else {
        debug!(job_id = %next.id, "Run job claimed by another worker");
        return Ok(ProcessOutcome::ClaimLost);
    };
    info!(
        job_id = %job.id,
        order_id = %job.order_id,
        attempts = job.attempts,
        "Run job claimed"
    );

    match orchestrator.run(&job.project_id, &job.context).await {
        Ok(_) => {
            queue.complete(&job.id).await?;
            info!(job_id = %job.id, "Run job completed");
            Ok(ProcessOutcome::Completed { job_id: job.id })
        }
        Err(err) => {
            let error = err.to_string();
            queue.fail(&job.id, &error).await?;
            warn!(job_id = %job.id, error = %error, "Run job failed");
            Ok(ProcessOutcome::Failed {
                job_id: job.id,
                error,
            })
        }
    }
}
