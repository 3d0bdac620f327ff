//! Per-invocation stage configuration.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use super::AttemptLedger;

/// Boxed stage work.
pub type StageFuture<T> = BoxFuture<'static, anyhow::Result<T>>;

/// Produces a fresh future for every attempt.
pub type StageWork<T> = Box<dyn Fn() -> StageFuture<T> + Send + Sync>;

/// Builds the checkpoint payload from a result and its duration.
pub type PayloadBuilder<T> = Box<dyn Fn(&T, u64) -> serde_json::Value + Send + Sync>;

/// Rebuilds a previous result from durable state.
pub type CacheLoader<T> = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<Option<T>>> + Send + Sync>;

/// Everything [`StageRunner::run_stage`](super::StageRunner::run_stage)
/// needs for one stage.
pub struct StageConfig<T> {
    /// Project the stage works on.
    pub project_id: String,
    /// Stable key, unique within the pipeline.
    pub stage_key: String,
    /// Human-readable name used in messages.
    pub label: String,
    /// Run identifier attached to every event.
    pub pipeline_run_id: Option<String>,
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Exhaustion yields `None` instead of an error.
    pub optional: bool,
    /// Attempt counts shared across the run.
    pub ledger: AttemptLedger,
    pub(crate) work: StageWork<T>,
    pub(crate) payload_builder: Option<PayloadBuilder<T>>,
    pub(crate) cache_loader: Option<CacheLoader<T>>,
}

impl<T> fmt::Debug for StageConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageConfig")
            .field("project_id", &self.project_id)
            .field("stage_key", &self.stage_key)
            .field("label", &self.label)
            .field("pipeline_run_id", &self.pipeline_run_id)
            .field("timeout", &self.timeout)
            .field("optional", &self.optional)
            .field("has_payload_builder", &self.payload_builder.is_some())
            .field("has_cache_loader", &self.cache_loader.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> StageConfig<T> {
    /// Creates a required stage with a fresh ledger.
    pub fn new<F, Fut>(
        project_id: impl Into<String>,
        stage_key: impl Into<String>,
        label: impl Into<String>,
        timeout: Duration,
        work: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            project_id: project_id.into(),
            stage_key: stage_key.into(),
            label: label.into(),
            pipeline_run_id: None,
            timeout,
            optional: false,
            ledger: AttemptLedger::new(),
            work: Box::new(move || work().boxed()),
            payload_builder: None,
            cache_loader: None,
        }
    }

    /// Sets the run identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Option<String>) -> Self {
        self.pipeline_run_id = run_id;
        self
    }

    /// Marks the stage optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Shares a run-wide attempt ledger.
    #[must_use]
    pub fn with_ledger(mut self, ledger: AttemptLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Sets how a result is turned into a checkpoint payload.
    #[must_use]
    pub fn with_checkpoint_payload<F>(mut self, build: F) -> Self
    where
        F: Fn(&T, u64) -> serde_json::Value + Send + Sync + 'static,
    {
        self.payload_builder = Some(Box::new(build));
        self
    }

    /// Sets how a completed stage's result is hydrated on resume.
    #[must_use]
    pub fn with_cached_result<F, Fut>(mut self, load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        self.cache_loader = Some(Box::new(move || load().boxed()));
        self
    }

    /// Deadline in whole milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
