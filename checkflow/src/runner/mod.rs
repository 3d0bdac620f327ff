//! Single-stage execution with resume, retry and timeout.
//!
//! [`StageRunner::run_stage`] drives one stage through:
//! 1. A skip check against the checkpoint store, hydrating the cached
//!    result when a loader is configured
//! 2. Attempts bounded by the [`RetryPolicy`], each raced against the
//!    stage deadline
//! 3. Checkpoint and telemetry writes at every transition
//!
//! Checkpoint and telemetry failures never change the stage outcome.

mod config;
mod ledger;
mod retry;
mod timeout;

pub use config::{CacheLoader, PayloadBuilder, StageConfig, StageFuture, StageWork};
pub use ledger::AttemptLedger;
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use timeout::{race_deadline, TimedResult};

use serde_json::json;
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::checkpoint::{CheckpointStore, StartMark};
use crate::core::{event_types, EventLevel, RunEvent};
use crate::errors::StageError;
use crate::observability::{stage_span, StageTimer};
use crate::persistence::Persisted;
use crate::telemetry::TelemetryLog;

/// Outcome of [`StageRunner::run_stage`].
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult<T> {
    /// The stage result. `None` for an exhausted optional stage, or a
    /// skipped stage without a cache loader.
    pub result: Option<T>,
    /// True if a completed checkpoint short-circuited execution.
    pub skipped: bool,
    /// Duration of the final attempt. Zero when skipped.
    pub duration_ms: u64,
}

impl<T> StageResult<T> {
    fn skipped(result: Option<T>) -> Self {
        Self {
            result,
            skipped: true,
            duration_ms: 0,
        }
    }

    /// Returns true if the stage produced or hydrated a result.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }
}

/// Executes stages against a checkpoint store and telemetry log.
#[derive(Debug, Clone, Default)]
pub struct StageRunner {
    checkpoints: CheckpointStore,
    telemetry: TelemetryLog,
    retry: RetryPolicy,
}

impl StageRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(checkpoints: CheckpointStore, telemetry: TelemetryLog, retry: RetryPolicy) -> Self {
        Self {
            checkpoints,
            telemetry,
            retry,
        }
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the checkpoint store.
    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Returns the telemetry log.
    #[must_use]
    pub fn telemetry(&self) -> &TelemetryLog {
        &self.telemetry
    }

    /// Runs one stage to completion, skip or exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Exhausted`] when a required stage fails every
    /// permitted attempt. Optional stages never error.
    pub async fn run_stage<T>(&self, config: StageConfig<T>) -> Result<StageResult<T>, StageError>
    where
        T: Send + 'static,
    {
        let span = stage_span(&config.project_id, &config.stage_key, &config.label);
        self.run_stage_inner(config).instrument(span).await
    }

    async fn run_stage_inner<T>(&self, config: StageConfig<T>) -> Result<StageResult<T>, StageError>
    where
        T: Send + 'static,
    {
        if let Some(skipped) = self.try_skip(&config).await {
            return Ok(skipped);
        }

        loop {
            let attempt = config.ledger.next_attempt(&config.stage_key);

            match self
                .checkpoints
                .mark_started(&config.project_id, &config.stage_key, attempt)
                .await
            {
                Persisted::Stored(StartMark::AlreadyCompleted) => {
                    debug!(attempt, "Checkpoint already completed; status left as is");
                }
                Persisted::Stored(StartMark::Started) => {}
                Persisted::Unavailable(reason) => {
                    trace!(%reason, "Start not checkpointed");
                }
            }

            self.record(
                stage_event(&config, event_types::STAGE_STARTED, EventLevel::Info)
                    .with_metadata("attempt", json!(attempt))
                    .with_metadata("max_attempts", json!(self.retry.max_attempts)),
            )
            .await;
            debug!(attempt, max_attempts = self.retry.max_attempts, "Stage attempt started");

            let timer = StageTimer::start();
            let outcome = race_deadline(config.timeout, (config.work)())
                .await
                .into_stage_result(&config.label, config.timeout);
            let duration_ms = timer.elapsed_ms();

            let err = match outcome {
                Ok(result) => {
                    let payload = config
                        .payload_builder
                        .as_ref()
                        .map_or_else(|| json!({}), |build| build(&result, duration_ms));
                    if let Persisted::Unavailable(reason) = self
                        .checkpoints
                        .mark_completed(&config.project_id, &config.stage_key, payload, duration_ms)
                        .await
                    {
                        trace!(%reason, "Completion not checkpointed");
                    }

                    self.record(
                        stage_event(&config, event_types::STAGE_COMPLETED, EventLevel::Info)
                            .with_metadata("attempt", json!(attempt))
                            .with_metadata("duration_ms", json!(duration_ms)),
                    )
                    .await;
                    info!(attempt, duration_ms, "Stage completed");

                    return Ok(StageResult {
                        result: Some(result),
                        skipped: false,
                        duration_ms,
                    });
                }
                Err(err) => err,
            };

            let message = err.to_string();
            if let Persisted::Unavailable(reason) = self
                .checkpoints
                .mark_failed(&config.project_id, &config.stage_key, &message, duration_ms)
                .await
            {
                trace!(%reason, "Failure not checkpointed");
            }

            let level = if config.optional {
                EventLevel::Warn
            } else {
                EventLevel::Error
            };
            self.record(
                stage_event(&config, event_types::STAGE_FAILED, level)
                    .with_metadata("attempt", json!(attempt))
                    .with_metadata("duration_ms", json!(duration_ms))
                    .with_metadata("error", json!(message)),
            )
            .await;

            if self.retry.allows_retry_after(attempt) {
                let backoff = self.retry.backoff_for(attempt);
                let backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
                self.record(
                    stage_event(&config, event_types::STAGE_RETRY_SCHEDULED, EventLevel::Warn)
                        .with_metadata("attempt", json!(attempt))
                        .with_metadata("next_attempt", json!(attempt + 1))
                        .with_metadata("backoff_ms", json!(backoff_ms))
                        .with_metadata("error", json!(message)),
                )
                .await;
                warn!(attempt, backoff_ms, error = %message, "Stage attempt failed; retrying");

                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            if config.optional {
                warn!(attempt, error = %message, "Optional stage exhausted; continuing without it");
                return Ok(StageResult {
                    result: None,
                    skipped: false,
                    duration_ms,
                });
            }

            error!(attempt, error = %message, "Stage exhausted");
            return Err(StageError::Exhausted {
                stage_key: config.stage_key.clone(),
                label: config.label.clone(),
                attempts: attempt,
                last_error: message,
            });
        }
    }

    /// Returns a skipped result if the stage is already complete and its
    /// result is available.
    async fn try_skip<T>(&self, config: &StageConfig<T>) -> Option<StageResult<T>>
    where
        T: Send + 'static,
    {
        if !self
            .checkpoints
            .should_skip(&config.project_id, &config.stage_key)
            .await
        {
            return None;
        }

        let hydrated = match &config.cache_loader {
            None => None,
            Some(load) => match load().await {
                Ok(Some(result)) => Some(result),
                Ok(None) => {
                    debug!("Checkpoint completed but no cached result; re-running");
                    return None;
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "Cached result unreadable; re-running");
                    return None;
                }
            },
        };

        self.record(
            stage_event(config, event_types::STAGE_SKIPPED, EventLevel::Info)
                .with_metadata("hydrated", json!(hydrated.is_some())),
        )
        .await;
        info!(hydrated = hydrated.is_some(), "Stage skipped; checkpoint already completed");

        Some(StageResult::skipped(hydrated))
    }

    async fn record(&self, event: RunEvent) {
        if let Persisted::Unavailable(reason) = self.telemetry.log_run_event(event).await {
            trace!(%reason, "Telemetry not recorded");
        }
    }
}

fn stage_event<T>(config: &StageConfig<T>, event_type: &str, level: EventLevel) -> RunEvent {
    let message = match event_type {
        event_types::STAGE_STARTED => format!("{} started", config.label),
        event_types::STAGE_COMPLETED => format!("{} completed", config.label),
        event_types::STAGE_FAILED => format!("{} failed", config.label),
        event_types::STAGE_RETRY_SCHEDULED => format!("{} retry scheduled", config.label),
        event_types::STAGE_SKIPPED => format!("{} skipped (checkpoint)", config.label),
        other => format!("{} {other}", config.label),
    };
    RunEvent::new(config.project_id.clone(), event_type, level, message)
        .with_run_id(config.pipeline_run_id.as_deref())
        .with_stage(config.stage_key.clone())
}
