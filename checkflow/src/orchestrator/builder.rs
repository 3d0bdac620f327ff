//! Orchestrator builder with validation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::{
    Agent, MarkdownReportWriter, NoOpProjectStatus, Orchestrator, ProjectStatusPort, ReportWriter,
    RunTracker, SynthesisAgent, DEFAULT_AGENT_TIMEOUT,
};
use crate::checkpoint::CheckpointStore;
use crate::config::PipelineSettings;
use crate::errors::ConfigError;
use crate::orchestrator::InMemoryRunTracker;
use crate::runner::StageRunner;
use crate::scoring::ScoreAggregator;
use crate::telemetry::TelemetryLog;

/// Builder for [`Orchestrator`].
///
/// Defaults: in-memory checkpoints, disabled telemetry, no synthesis,
/// [`MarkdownReportWriter`], equal weighting, settings from
/// [`PipelineSettings::default`].
pub struct OrchestratorBuilder {
    agents: Vec<Arc<dyn Agent>>,
    synthesis: Option<Arc<dyn SynthesisAgent>>,
    report_writer: Arc<dyn ReportWriter>,
    aggregator: ScoreAggregator,
    checkpoints: CheckpointStore,
    telemetry: TelemetryLog,
    settings: PipelineSettings,
    status: Arc<dyn ProjectStatusPort>,
    tracker: Arc<dyn RunTracker>,
    report_timeout: Duration,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            synthesis: None,
            report_writer: Arc::new(MarkdownReportWriter::default()),
            aggregator: ScoreAggregator::default(),
            checkpoints: CheckpointStore::in_memory(),
            telemetry: TelemetryLog::disabled(),
            settings: PipelineSettings::default(),
            status: Arc::new(NoOpProjectStatus),
            tracker: Arc::new(InMemoryRunTracker::new()),
            report_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }
}

impl Orchestrator {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }
}

impl OrchestratorBuilder {
    /// Registers an agent stage. Registry order is report order.
    #[must_use]
    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Registers several agent stages.
    #[must_use]
    pub fn agents<I>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Agent>>,
    {
        self.agents.extend(agents);
        self
    }

    /// Sets the synthesis stage.
    #[must_use]
    pub fn synthesis(mut self, synthesis: Arc<dyn SynthesisAgent>) -> Self {
        self.synthesis = Some(synthesis);
        self
    }

    /// Sets the report writer.
    #[must_use]
    pub fn report_writer(mut self, writer: Arc<dyn ReportWriter>) -> Self {
        self.report_writer = writer;
        self
    }

    /// Sets the report stage deadline.
    #[must_use]
    pub fn report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout = timeout;
        self
    }

    /// Sets the score aggregator.
    #[must_use]
    pub fn aggregator(mut self, aggregator: ScoreAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Sets the checkpoint store.
    #[must_use]
    pub fn checkpoints(mut self, checkpoints: CheckpointStore) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Sets the telemetry log.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryLog) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Sets retry and threshold settings.
    #[must_use]
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the project status port.
    #[must_use]
    pub fn status_port(mut self, status: Arc<dyn ProjectStatusPort>) -> Self {
        self.status = status;
        self
    }

    /// Sets the run tracker.
    #[must_use]
    pub fn run_tracker(mut self, tracker: Arc<dyn RunTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Validates and builds.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::DuplicateStageKey`] if two stages share a key
    /// - [`ConfigError::UnreachableThreshold`] if the success threshold
    ///   exceeds the number of agents
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let mut seen = HashSet::new();
        let keys = self
            .agents
            .iter()
            .map(|a| a.key())
            .chain(self.synthesis.as_ref().map(|s| s.key()))
            .chain(std::iter::once(super::REPORT_STAGE_KEY));
        for key in keys {
            if !seen.insert(key) {
                return Err(ConfigError::DuplicateStageKey {
                    key: key.to_string(),
                });
            }
        }

        let required_successes = self.settings.required_successes(self.agents.len())?;
        let runner = StageRunner::new(self.checkpoints, self.telemetry, self.settings.retry.clone());

        Ok(Orchestrator {
            agents: self.agents,
            synthesis: self.synthesis,
            report_writer: self.report_writer,
            aggregator: Arc::new(self.aggregator),
            runner,
            settings: self.settings,
            required_successes,
            status: self.status,
            tracker: self.tracker,
            report_timeout: self.report_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAgent;

    fn agents(n: usize) -> Vec<Arc<dyn Agent>> {
        (0..n)
            .map(|i| Arc::new(ScriptedAgent::new(format!("a{i}"), format!("D{i}"), 7.0)) as Arc<dyn Agent>)
            .collect()
    }

    #[test]
    fn test_default_threshold_is_strict_majority() {
        let orchestrator = Orchestrator::builder().agents(agents(7)).build().unwrap();
        assert_eq!(orchestrator.required_successes(), 4);
        assert_eq!(orchestrator.stage_keys().len(), 7);

        let orchestrator = Orchestrator::builder().agents(agents(4)).build().unwrap();
        assert_eq!(orchestrator.required_successes(), 3);
    }

    #[test]
    fn test_explicit_threshold() {
        let settings = PipelineSettings::default().with_min_required_successes(2);
        let orchestrator = Orchestrator::builder()
            .agents(agents(5))
            .settings(settings)
            .build()
            .unwrap();
        assert_eq!(orchestrator.required_successes(), 2);
    }

    #[test]
    fn test_unreachable_threshold_rejected() {
        let settings = PipelineSettings::default().with_min_required_successes(6);
        let err = Orchestrator::builder()
            .agents(agents(5))
            .settings(settings)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::UnreachableThreshold { required: 6, total: 5 });
    }

    #[test]
    fn test_empty_registry_rejected() {
        let err = Orchestrator::builder().build().unwrap_err();
        assert_eq!(err, ConfigError::UnreachableThreshold { required: 1, total: 0 });
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = Orchestrator::builder()
            .agent(Arc::new(ScriptedAgent::new("market", "Demand", 7.0)))
            .agent(Arc::new(ScriptedAgent::new("market", "Finance", 7.0)))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateStageKey { key: "market".into() });
    }

    #[test]
    fn test_agent_may_not_use_report_key() {
        let err = Orchestrator::builder()
            .agent(Arc::new(ScriptedAgent::new("report", "Demand", 7.0)))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStageKey { .. }));
    }
}
