//! Fan-out, threshold, synthesis and report for one project.

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn, Instrument};

use super::report::{report_hash, REPORT_STAGE_KEY};
use super::{
    Agent, AgentOutput, CompletedComponent, ProjectContext, ProjectStatusPort, ReportInput,
    ReportWriter, RunPlan, RunSummary, RunTracker, SynthesisAgent,
};
use crate::checkpoint::CheckpointStore;
use crate::config::PipelineSettings;
use crate::core::{event_types, EventLevel, ProjectStatus, RunEvent};
use crate::errors::{CheckflowError, InsufficientSuccessError, StageError};
use crate::observability::{run_span, StageTimer};
use crate::persistence::Persisted;
use crate::runner::{AttemptLedger, StageConfig, StageResult, StageRunner};
use crate::scoring::{CompositeResult, DimensionScore, Recommendation, ScoreAggregator};
use crate::telemetry::RUNTIME_SECONDS_KEY;

/// Caller-facing outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Tracker-assigned run id, if tracking was available.
    pub pipeline_run_id: Option<String>,
    /// Composite, recommendation and per-dimension scores.
    pub composite: CompositeResult,
    /// Synthesis narrative, if that stage completed.
    pub synthesis_markdown: Option<String>,
    /// The compiled report.
    pub report_markdown: String,
    /// SHA-256 of `report_markdown`.
    pub report_hash: String,
    /// Agent stages that contributed a defaulted score.
    pub failed_stages: Vec<String>,
}

impl RunResult {
    /// Composite score.
    #[must_use]
    pub fn composite_score(&self) -> f64 {
        self.composite.composite_score
    }

    /// Final recommendation.
    #[must_use]
    pub fn recommendation(&self) -> Recommendation {
        self.composite.recommendation
    }

    /// Scores for every registered dimension.
    #[must_use]
    pub fn dimensions(&self) -> &[DimensionScore] {
        &self.composite.dimensions
    }
}

/// Report stage result, also its checkpoint payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScoredReport {
    composite: CompositeResult,
    markdown: String,
}

/// Synthesis stage result, also its checkpoint payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SynthesisOutput {
    markdown: String,
}

/// Inputs of the report stage, shared by every attempt.
struct ReportDraft {
    project_id: String,
    context: ProjectContext,
    dimensions: Vec<DimensionScore>,
    synthesis_markdown: Option<String>,
    components: Vec<CompletedComponent>,
}

impl ReportDraft {
    /// Everything that shapes the report, so a stored report is reused
    /// only when none of it changed.
    fn fingerprint(&self) -> String {
        inputs_fingerprint(&(
            &self.context,
            &self.dimensions,
            &self.synthesis_markdown,
            &self.components,
        ))
    }
}

/// Runs every registered agent for a project and compiles the report.
///
/// Build one with [`Orchestrator::builder`](super::OrchestratorBuilder).
pub struct Orchestrator {
    pub(super) agents: Vec<Arc<dyn Agent>>,
    pub(super) synthesis: Option<Arc<dyn SynthesisAgent>>,
    pub(super) report_writer: Arc<dyn ReportWriter>,
    pub(super) aggregator: Arc<ScoreAggregator>,
    pub(super) runner: StageRunner,
    pub(super) settings: PipelineSettings,
    pub(super) required_successes: usize,
    pub(super) status: Arc<dyn ProjectStatusPort>,
    pub(super) tracker: Arc<dyn RunTracker>,
    pub(super) report_timeout: Duration,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.agents.iter().map(|a| a.key()).collect::<Vec<_>>())
            .field("synthesis", &self.synthesis.as_ref().map(|s| s.key()))
            .field("settings", &self.settings)
            .field("required_successes", &self.required_successes)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Agent stage keys in registry order.
    #[must_use]
    pub fn stage_keys(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.key()).collect()
    }

    /// Completed agent stages a run needs before synthesis.
    #[must_use]
    pub fn required_successes(&self) -> usize {
        self.required_successes
    }

    /// Runs the pipeline for `project_id`.
    ///
    /// # Errors
    ///
    /// - [`CheckflowError::InsufficientSuccess`] when too few agent stages
    ///   completed
    /// - [`CheckflowError::ReportFailed`] when the report stage exhausted
    ///   its attempts; the error carries the dimension scores
    pub async fn run(
        &self,
        project_id: &str,
        context: &ProjectContext,
    ) -> Result<RunResult, CheckflowError> {
        let timer = StageTimer::start();
        let plan = self.plan();

        let started = self.tracker.start_run(project_id, &plan).await;
        let run_id = match Persisted::from_result("run_tracker", "start_run", started) {
            Persisted::Stored(run_id) => Some(run_id),
            Persisted::Unavailable(reason) => {
                debug!(%reason, "Run not tracked");
                None
            }
        };

        let span = run_span(project_id, run_id.as_deref());
        self.execute(project_id, context, run_id, timer)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        project_id: &str,
        context: &ProjectContext,
        run_id: Option<String>,
        timer: StageTimer,
    ) -> Result<RunResult, CheckflowError> {
        let run_id_ref = run_id.as_deref();
        let total = self.agents.len();

        self.set_status(project_id, ProjectStatus::Researching).await;
        self.record(
            run_event(
                project_id,
                run_id_ref,
                event_types::RUN_STARTED,
                EventLevel::Info,
                format!("Pipeline started with {total} stages"),
            )
            .with_metadata("stages", json!(self.stage_keys()))
            .with_metadata("required_successes", json!(self.required_successes)),
        )
        .await;
        info!(stages = total, required = self.required_successes, "Pipeline started");

        let ledger = AttemptLedger::new();
        let shared_context = Arc::new(context.clone());
        let settled = join_all(self.agents.iter().map(|agent| {
            self.run_agent(
                project_id,
                run_id_ref,
                agent.clone(),
                shared_context.clone(),
                ledger.clone(),
            )
        }))
        .await;

        let mut completed = Vec::with_capacity(total);
        let mut failed_stages = Vec::new();
        for (agent, outcome) in self.agents.iter().zip(settled) {
            match outcome {
                Ok(StageResult {
                    result: Some(output),
                    ..
                }) => completed.push(CompletedComponent {
                    key: agent.key().to_string(),
                    label: agent.label().to_string(),
                    dimension: agent.dimension().to_string(),
                    output,
                }),
                Ok(StageResult { result: None, .. }) => {
                    failed_stages.push(agent.key().to_string());
                }
                Err(err) => {
                    warn!(stage_key = agent.key(), error = %err, "Agent stage did not complete");
                    failed_stages.push(agent.key().to_string());
                }
            }
        }

        let succeeded = completed.len();
        info!(succeeded, total, "Agent stages settled");

        if succeeded < self.required_successes {
            let err = InsufficientSuccessError {
                succeeded,
                required: self.required_successes,
                total,
                failed_stages,
            };
            self.set_status(project_id, ProjectStatus::Error).await;
            self.record(
                run_event(
                    project_id,
                    run_id_ref,
                    event_types::RUN_ABORTED_INSUFFICIENT_SUCCESS,
                    EventLevel::Error,
                    err.to_string(),
                )
                .with_metadata("succeeded", json!(err.succeeded))
                .with_metadata("required", json!(err.required))
                .with_metadata("total", json!(err.total))
                .with_metadata("failed_stages", json!(err.failed_stages)),
            )
            .await;
            error!(succeeded, required = err.required, total, "Pipeline aborted");
            return Err(err.into());
        }

        let dimensions = self.dimension_scores(&completed);
        let synthesis_markdown = self
            .run_synthesis(project_id, run_id_ref, &shared_context, &completed, &ledger)
            .await;

        let draft = Arc::new(ReportDraft {
            project_id: project_id.to_string(),
            context: context.clone(),
            dimensions: dimensions.clone(),
            synthesis_markdown: synthesis_markdown.clone(),
            components: completed,
        });

        let report = match self.run_report(run_id_ref, draft, &ledger).await {
            Ok(report) => report,
            Err(source) => {
                self.set_status(project_id, ProjectStatus::Error).await;
                self.record(
                    run_event(
                        project_id,
                        run_id_ref,
                        event_types::RUN_FAILED,
                        EventLevel::Error,
                        source.to_string(),
                    )
                    .with_metadata(RUNTIME_SECONDS_KEY, json!(timer.elapsed_secs()))
                    .with_metadata("stage_key", json!(REPORT_STAGE_KEY)),
                )
                .await;
                error!(error = %source, "Pipeline failed at report stage");
                return Err(CheckflowError::ReportFailed {
                    source,
                    dimensions,
                    synthesis_markdown,
                });
            }
        };

        let hash = report_hash(&report.markdown);
        let runtime_seconds = timer.elapsed_secs();

        if let Some(run_id) = run_id_ref {
            let summary = RunSummary {
                runtime_seconds,
                agent_scores: self
                    .agents
                    .iter()
                    .zip(&dimensions)
                    .map(|(agent, dim)| (agent.key().to_string(), dim.score))
                    .collect::<BTreeMap<_, _>>(),
                composite_score: report.composite.composite_score,
                recommendation: report.composite.recommendation,
                report_markdown_hash: hash.clone(),
                failed_stages: failed_stages.clone(),
            };
            let completed_run = self.tracker.complete_run(run_id, &summary).await;
            if let Persisted::Unavailable(reason) =
                Persisted::from_result("run_tracker", "complete_run", completed_run)
            {
                debug!(%reason, "Run completion not tracked");
            }
        }

        self.set_status(project_id, ProjectStatus::Review).await;
        self.record(
            run_event(
                project_id,
                run_id_ref,
                event_types::RUN_COMPLETED,
                EventLevel::Info,
                format!(
                    "Pipeline completed: {:.1}/10 {}",
                    report.composite.composite_score, report.composite.recommendation
                ),
            )
            .with_metadata(RUNTIME_SECONDS_KEY, json!(runtime_seconds))
            .with_metadata("composite_score", json!(report.composite.composite_score))
            .with_metadata("recommendation", json!(report.composite.recommendation))
            .with_metadata("report_hash", json!(hash)),
        )
        .await;
        info!(
            composite_score = report.composite.composite_score,
            recommendation = %report.composite.recommendation,
            runtime_seconds,
            "Pipeline completed"
        );

        Ok(RunResult {
            pipeline_run_id: run_id,
            composite: report.composite,
            synthesis_markdown,
            report_markdown: report.markdown,
            report_hash: hash,
            failed_stages,
        })
    }

    async fn run_agent(
        &self,
        project_id: &str,
        run_id: Option<&str>,
        agent: Arc<dyn Agent>,
        context: Arc<ProjectContext>,
        ledger: AttemptLedger,
    ) -> Result<StageResult<AgentOutput>, StageError> {
        let owned_project = project_id.to_string();
        let worker = agent.clone();
        let mut config = StageConfig::new(
            project_id,
            agent.key(),
            agent.label(),
            agent.timeout(),
            move || {
                let agent = worker.clone();
                let context = context.clone();
                let project_id = owned_project.clone();
                async move { agent.run(&project_id, &context).await }
            },
        )
        .with_run_id(run_id.map(String::from))
        .with_ledger(ledger);
        if agent.optional() {
            config = config.optional();
        }

        self.runner.run_stage(self.checkpointed(config)).await
    }

    async fn run_synthesis(
        &self,
        project_id: &str,
        run_id: Option<&str>,
        context: &Arc<ProjectContext>,
        completed: &[CompletedComponent],
        ledger: &AttemptLedger,
    ) -> Option<String> {
        let Some(synthesis) = self.synthesis.clone() else {
            debug!("No synthesis stage configured");
            return None;
        };

        let inputs = inputs_fingerprint(&(&**context, completed));
        let components: Arc<[CompletedComponent]> = completed.into();
        let context = context.clone();
        let owned_project = project_id.to_string();
        let worker = synthesis.clone();
        let config = StageConfig::new(
            project_id,
            synthesis.key(),
            synthesis.label(),
            synthesis.timeout(),
            move || {
                let synthesis = worker.clone();
                let context = context.clone();
                let components = components.clone();
                let project_id = owned_project.clone();
                async move {
                    let markdown = synthesis.synthesize(&project_id, &context, &components).await?;
                    Ok::<_, anyhow::Error>(SynthesisOutput { markdown })
                }
            },
        )
        .with_run_id(run_id.map(String::from))
        .with_ledger(ledger.clone())
        .optional();

        let markdown = match self.runner.run_stage(self.checkpointed_for(config, inputs)).await {
            Ok(outcome) => outcome.result.map(|output| output.markdown),
            Err(err) => {
                warn!(error = %err, "Synthesis stage errored");
                None
            }
        };

        if markdown.is_none() {
            self.record(
                run_event(
                    project_id,
                    run_id,
                    event_types::SYNTHESIS_UNAVAILABLE,
                    EventLevel::Warn,
                    "Synthesis unavailable; report continues without it",
                )
                .with_stage(synthesis.key()),
            )
            .await;
            warn!("Continuing without synthesis");
        }
        markdown
    }

    async fn run_report(
        &self,
        run_id: Option<&str>,
        draft: Arc<ReportDraft>,
        ledger: &AttemptLedger,
    ) -> Result<ScoredReport, StageError> {
        let inputs = draft.fingerprint();
        let aggregator = self.aggregator.clone();
        let writer = self.report_writer.clone();
        let project_id = draft.project_id.clone();
        let config = StageConfig::new(
            project_id,
            REPORT_STAGE_KEY,
            "Report",
            self.report_timeout,
            move || {
                let aggregator = aggregator.clone();
                let writer = writer.clone();
                let draft = draft.clone();
                async move {
                    let composite = aggregator.calculate_program_score(&draft.dimensions)?;
                    let input = ReportInput {
                        project_id: draft.project_id.clone(),
                        context: draft.context.clone(),
                        composite,
                        synthesis_markdown: draft.synthesis_markdown.clone(),
                        components: draft.components.clone(),
                    };
                    let markdown = writer.write(&input).await?;
                    Ok::<_, anyhow::Error>(ScoredReport {
                        composite: input.composite,
                        markdown,
                    })
                }
            },
        )
        .with_run_id(run_id.map(String::from))
        .with_ledger(ledger.clone());

        match self.runner.run_stage(self.checkpointed_for(config, inputs)).await? {
            StageResult {
                result: Some(report),
                ..
            } => Ok(report),
            StageResult { result: None, .. } => {
                Err(StageError::failed("Report", "report stage produced no result"))
            }
        }
    }

    /// One score per registered agent, in registry order. Agents without a
    /// completed result get the default score.
    fn dimension_scores(&self, completed: &[CompletedComponent]) -> Vec<DimensionScore> {
        self.agents
            .iter()
            .map(|agent| {
                completed
                    .iter()
                    .find(|c| c.key == agent.key())
                    .map_or_else(
                        || DimensionScore::defaulted(agent.dimension()),
                        |c| {
                            DimensionScore::new(
                                agent.dimension(),
                                c.output.data.score,
                                c.output.data.score_rationale.clone(),
                            )
                        },
                    )
            })
            .collect()
    }

    /// Stores the stage result as its checkpoint payload and hydrates it
    /// on resume.
    fn checkpointed<T>(&self, config: StageConfig<T>) -> StageConfig<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let store = self.runner.checkpoints().clone();
        let project_id = config.project_id.clone();
        let stage_key = config.stage_key.clone();

        config
            .with_checkpoint_payload(|result: &T, _duration_ms| {
                serde_json::to_value(result).unwrap_or_else(|_| json!({}))
            })
            .with_cached_result(move || {
                let store = store.clone();
                let project_id = project_id.clone();
                let stage_key = stage_key.clone();
                async move { load_cached(&store, &project_id, &stage_key).await }
            })
    }

    /// Like [`Self::checkpointed`], but the payload also records the
    /// fingerprint of the stage inputs. A stored result computed from other
    /// inputs is not hydrated and the stage runs again.
    fn checkpointed_for<T>(&self, config: StageConfig<T>, inputs: String) -> StageConfig<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let store = self.runner.checkpoints().clone();
        let project_id = config.project_id.clone();
        let stage_key = config.stage_key.clone();
        let recorded = inputs.clone();

        config
            .with_checkpoint_payload(move |result: &T, _duration_ms| {
                serde_json::to_value(result).map_or_else(
                    |_| json!({}),
                    |result| json!({ "inputs": recorded.clone(), "result": result }),
                )
            })
            .with_cached_result(move || {
                let store = store.clone();
                let project_id = project_id.clone();
                let stage_key = stage_key.clone();
                let inputs = inputs.clone();
                async move { load_cached_for(&store, &project_id, &stage_key, &inputs).await }
            })
    }

    fn plan(&self) -> RunPlan {
        RunPlan {
            agents: self.stage_keys().into_iter().map(String::from).collect(),
            synthesis_enabled: self.synthesis.is_some(),
            max_attempts: self.runner.retry_policy().max_attempts,
            min_required_successes: self.required_successes,
        }
    }

    async fn set_status(&self, project_id: &str, status: ProjectStatus) {
        let result = self.status.set_status(project_id, status).await;
        if let Persisted::Unavailable(reason) =
            Persisted::from_result("project_status", "set_status", result)
        {
            trace!(%reason, %status, "Project status not recorded");
        }
    }

    async fn record(&self, event: RunEvent) {
        if let Persisted::Unavailable(reason) = self.runner.telemetry().log_run_event(event).await {
            trace!(%reason, "Telemetry not recorded");
        }
    }
}

async fn load_cached<T: DeserializeOwned>(
    store: &CheckpointStore,
    project_id: &str,
    stage_key: &str,
) -> anyhow::Result<Option<T>> {
    match store.completed_payload(project_id, stage_key).await {
        Some(payload) => Ok(Some(serde_json::from_value(payload)?)),
        None => Ok(None),
    }
}

async fn load_cached_for<T: DeserializeOwned>(
    store: &CheckpointStore,
    project_id: &str,
    stage_key: &str,
    inputs: &str,
) -> anyhow::Result<Option<T>> {
    let Some(mut payload) = store.completed_payload(project_id, stage_key).await else {
        return Ok(None);
    };
    if payload.get("inputs").and_then(serde_json::Value::as_str) != Some(inputs) {
        debug!(stage_key, "Stored result was computed from different inputs");
        return Ok(None);
    }
    let result = payload
        .get_mut("result")
        .map_or(serde_json::Value::Null, serde_json::Value::take);
    Ok(Some(serde_json::from_value(result)?))
}

/// SHA-256 over the JSON form of a stage's inputs.
fn inputs_fingerprint<S: Serialize + ?Sized>(inputs: &S) -> String {
    serde_json::to_string(inputs).map_or_else(|_| String::new(), |encoded| report_hash(&encoded))
}

fn run_event(
    project_id: &str,
    run_id: Option<&str>,
    event_type: &str,
    level: EventLevel,
    message: impl Into<String>,
) -> RunEvent {
    RunEvent::new(project_id, event_type, level, message).with_run_id(run_id)
}
