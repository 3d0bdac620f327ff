//! End-to-end orchestrator runs on virtual time.

#[cfg(test)]
mod tests {
    use crate::checkpoint::{CheckpointStore, InMemoryCheckpointBackend};
    use crate::config::PipelineSettings;
    use crate::core::{event_types, CheckpointStatus, EventLevel, ProjectStatus};
    use crate::errors::{CheckflowError, StageError};
    use crate::orchestrator::{
        report_hash, Agent, InMemoryProjectStatus, MockProjectStatusPort, MockRunTracker,
        Orchestrator, OrchestratorBuilder, ProjectContext, REPORT_STAGE_KEY,
    };
    use crate::runner::RetryPolicy;
    use crate::scoring::{Recommendation, DEFAULT_RATIONALE};
    use crate::telemetry::{InMemoryEventSink, RunHealth, TelemetryLog};
    use crate::testing::{
        assert_checkpoint_status, assert_event_count, assert_stage_attempts, FailingReportWriter,
        ScriptedAgent, ScriptedSynthesis, UnprovisionedCheckpointBackend,
    };
    use mockall::predicate::eq;
    use mockall::Sequence;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct Fixture {
        agents: Vec<Arc<ScriptedAgent>>,
        backend: InMemoryCheckpointBackend,
        sink: Arc<InMemoryEventSink>,
        status: InMemoryProjectStatus,
    }

    impl Fixture {
        fn new(agents: Vec<ScriptedAgent>) -> Self {
            Self {
                agents: agents.into_iter().map(Arc::new).collect(),
                backend: InMemoryCheckpointBackend::new(),
                sink: Arc::new(InMemoryEventSink::new()),
                status: InMemoryProjectStatus::new(),
            }
        }

        fn builder(&self) -> OrchestratorBuilder {
            Orchestrator::builder()
                .agents(self.agents.iter().map(|a| a.clone() as Arc<dyn Agent>))
                .checkpoints(CheckpointStore::new(Arc::new(self.backend.clone())))
                .telemetry(TelemetryLog::new(self.sink.clone()))
                .status_port(Arc::new(self.status.clone()))
        }

        fn calls(&self) -> Vec<u32> {
            self.agents.iter().map(|a| a.calls()).collect()
        }
    }

    fn panel(scores: &[f64]) -> Vec<ScriptedAgent> {
        panel_failing_from(scores, scores.len())
    }

    /// Agents from index `first_failing` onwards always fail.
    fn panel_failing_from(scores: &[f64], first_failing: usize) -> Vec<ScriptedAgent> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                let agent = ScriptedAgent::new(format!("agent_{i}"), format!("Dimension {i}"), *score);
                if i >= first_failing {
                    agent.always_failing()
                } else {
                    agent
                }
            })
            .collect()
    }

    fn context() -> ProjectContext {
        ProjectContext::new("Welding Technician Certificate")
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_retries_and_optional_default() {
        let agents = vec![
            ScriptedAgent::new("labor", "Labor Market", 8.0),
            ScriptedAgent::new("employers", "Employer Demand", 8.0).hanging_first(1),
            ScriptedAgent::new("learners", "Learner Demand", 8.0),
            ScriptedAgent::new("competition", "Competitive Landscape", 7.0).hanging_first(1),
            ScriptedAgent::new("fit", "Institutional Fit", 7.0),
            ScriptedAgent::new("finance", "Financial Viability", 7.4),
            ScriptedAgent::new("regulatory", "Regulatory", 9.0)
                .always_failing()
                .optional(),
        ];
        let fixture = Fixture::new(agents);
        let synthesis = Arc::new(ScriptedSynthesis::new("## Synthesis\nProceed with conditions."));
        let orchestrator = fixture.builder().synthesis(synthesis.clone()).build().unwrap();

        let result = orchestrator.run("p1", &context()).await.unwrap();

        assert_eq!(fixture.calls(), vec![1, 2, 1, 2, 1, 1, 2]);
        assert!((result.composite_score() - 7.2).abs() < f64::EPSILON);
        assert_eq!(result.recommendation(), Recommendation::ConditionalGo);
        assert_eq!(result.dimensions().len(), 7);

        let defaulted: Vec<&str> = result
            .dimensions()
            .iter()
            .filter(|d| d.is_defaulted())
            .map(|d| d.dimension.as_str())
            .collect();
        assert_eq!(defaulted, vec!["Regulatory"]);
        let regulatory = &result.dimensions()[6];
        assert!((regulatory.score - 5.0).abs() < f64::EPSILON);
        assert_eq!(regulatory.rationale, DEFAULT_RATIONALE);
        assert_eq!(result.failed_stages, vec!["regulatory"]);

        assert_eq!(synthesis.calls(), 1);
        assert_eq!(synthesis.components_seen(), 6);
        assert_eq!(
            result.synthesis_markdown.as_deref(),
            Some("## Synthesis\nProceed with conditions.")
        );
        assert_eq!(result.report_hash, report_hash(&result.report_markdown));
        assert!(result.report_markdown.contains("## employers"));

        let timeouts = fixture.sink.events_for_stage("employers");
        assert!(timeouts.iter().any(|e| {
            e.event_type == event_types::STAGE_FAILED
                && e.metadata_value("error")
                    == Some(&serde_json::json!("employers timed out after 30000ms"))
        }));
        assert_stage_attempts(&fixture.sink, "regulatory", 2);
        assert!(fixture
            .sink
            .events_for_stage("regulatory")
            .iter()
            .filter(|e| e.event_type == event_types::STAGE_FAILED)
            .all(|e| e.level == EventLevel::Warn));

        assert_checkpoint_status(&fixture.backend, "p1", "employers", CheckpointStatus::Completed);
        assert_checkpoint_status(&fixture.backend, "p1", "regulatory", CheckpointStatus::Failed);
        assert_checkpoint_status(&fixture.backend, "p1", REPORT_STAGE_KEY, CheckpointStatus::Completed);
        assert_eq!(
            fixture.status.history("p1"),
            vec![ProjectStatus::Researching, ProjectStatus::Review]
        );
        assert_event_count(&fixture.sink, event_types::STAGE_RETRY_SCHEDULED, "competition", 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_failures_of_seven_abort_before_synthesis() {
        let fixture = Fixture::new(panel_failing_from(&[8.0, 8.0, 8.0, 7.0, 7.0, 7.0, 7.0], 3));
        let synthesis = Arc::new(ScriptedSynthesis::new("unused"));
        let orchestrator = fixture
            .builder()
            .synthesis(synthesis.clone())
            .settings(PipelineSettings::default().with_min_required_successes(4))
            .build()
            .unwrap();

        let err = orchestrator.run("p1", &context()).await.unwrap_err();

        match err {
            CheckflowError::InsufficientSuccess(insufficient) => {
                assert_eq!(insufficient.succeeded, 3);
                assert_eq!(insufficient.required, 4);
                assert_eq!(insufficient.total, 7);
                assert_eq!(insufficient.failed_stages, vec!["agent_3", "agent_4", "agent_5", "agent_6"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(synthesis.calls(), 0);
        assert!(fixture.backend.get("p1", REPORT_STAGE_KEY).is_none());
        assert_eq!(
            fixture
                .sink
                .events_of_type(event_types::RUN_ABORTED_INSUFFICIENT_SUCCESS)
                .len(),
            1
        );
        assert_eq!(fixture.status.current("p1"), Some(ProjectStatus::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_threshold_successes_proceed() {
        let fixture = Fixture::new(panel_failing_from(&[8.0, 8.0, 8.0, 8.0, 7.0, 7.0, 7.0], 4));
        let synthesis = Arc::new(ScriptedSynthesis::new("## Synthesis"));
        let orchestrator = fixture.builder().synthesis(synthesis.clone()).build().unwrap();
        assert_eq!(orchestrator.required_successes(), 4);

        let result = orchestrator.run("p1", &context()).await.unwrap();

        assert_eq!(synthesis.calls(), 1);
        assert_eq!(result.failed_stages.len(), 3);
        // (4 * 8 + 3 * 5) / 7 = 6.71
        assert!((result.composite_score() - 6.7).abs() < f64::EPSILON);
        assert_eq!(result.recommendation(), Recommendation::ConditionalGo);
        assert_eq!(fixture.status.current("p1"), Some(ProjectStatus::Review));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanently_failing_stage_attempted_max_times() {
        let agents = vec![
            ScriptedAgent::new("steady", "Demand", 7.0),
            ScriptedAgent::new("broken", "Finance", 7.0).always_failing(),
        ];
        let fixture = Fixture::new(agents);
        let settings = PipelineSettings::default()
            .with_retry(RetryPolicy::default().with_max_attempts(3))
            .with_min_required_successes(1);
        let orchestrator = fixture.builder().settings(settings).build().unwrap();

        let start = tokio::time::Instant::now();
        orchestrator.run("p1", &context()).await.unwrap();

        assert_eq!(fixture.calls(), vec![1, 3]);
        assert_stage_attempts(&fixture.sink, "broken", 3);
        // Linear backoff: 2000ms then 4000ms.
        assert!(start.elapsed() >= std::time::Duration::from_millis(6000));
        let backoffs: Vec<_> = fixture
            .sink
            .events_for_stage("broken")
            .into_iter()
            .filter(|e| e.event_type == event_types::STAGE_RETRY_SCHEDULED)
            .filter_map(|e| e.metadata_value("backoff_ms").and_then(serde_json::Value::as_u64))
            .collect();
        assert_eq!(backoffs, vec![2000, 4000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unprovisioned_checkpoints_do_not_affect_run() {
        let fixture = Fixture::new(panel(&[8.0, 7.0, 6.0]));
        let backend = Arc::new(UnprovisionedCheckpointBackend::default());
        let orchestrator = fixture
            .builder()
            .checkpoints(CheckpointStore::new(backend.clone()))
            .synthesis(Arc::new(ScriptedSynthesis::new("## Synthesis")))
            .build()
            .unwrap();

        let result = orchestrator.run("p1", &context()).await.unwrap();

        assert!((result.composite_score() - 7.0).abs() < f64::EPSILON);
        assert_eq!(fixture.calls(), vec![1, 1, 1]);
        assert!(backend.calls() > 0);
        assert!(fixture.sink.events_of_type(event_types::STAGE_FAILED).is_empty());
        assert!(fixture
            .sink
            .events_of_type(event_types::STAGE_RETRY_SCHEDULED)
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_hydrates_completed_stages() {
        let fixture = Fixture::new(panel(&[8.0, 7.0, 6.0]));
        let orchestrator = fixture
            .builder()
            .synthesis(Arc::new(ScriptedSynthesis::new("## Synthesis")))
            .build()
            .unwrap();

        let first = orchestrator.run("p1", &context()).await.unwrap();
        let second = orchestrator.run("p1", &context()).await.unwrap();

        assert_eq!(fixture.calls(), vec![1, 1, 1]);
        assert_eq!(second.report_markdown, first.report_markdown);
        assert_eq!(second.composite, first.composite);
        assert_eq!(second.synthesis_markdown, first.synthesis_markdown);
        assert_eq!(fixture.sink.events_of_type(event_types::STAGE_SKIPPED).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_recomputes_report_when_a_dimension_recovers() {
        let fixture = Fixture::new(vec![
            ScriptedAgent::new("a", "A", 8.0),
            ScriptedAgent::new("b", "B", 8.0),
            ScriptedAgent::new("c", "C", 8.0).failing_first(2),
        ]);
        let synthesis = Arc::new(ScriptedSynthesis::new("## Synthesis"));
        let orchestrator = fixture.builder().synthesis(synthesis.clone()).build().unwrap();

        let first = orchestrator.run("p1", &context()).await.unwrap();
        assert_eq!(first.failed_stages, vec!["c"]);
        assert!((first.composite_score() - 7.0).abs() < f64::EPSILON);
        assert_eq!(synthesis.components_seen(), 2);

        let second = orchestrator.run("p1", &context()).await.unwrap();
        assert_eq!(fixture.calls(), vec![1, 1, 3]);
        assert!(second.failed_stages.is_empty());
        assert!((second.composite_score() - 8.0).abs() < f64::EPSILON);
        assert_eq!(second.recommendation(), Recommendation::StrongGo);
        assert!(second.dimensions().iter().all(|d| !d.is_defaulted()));
        assert_ne!(second.report_hash, first.report_hash);
        assert_eq!(synthesis.calls(), 2);
        assert_eq!(synthesis.components_seen(), 3);
        assert_checkpoint_status(&fixture.backend, "p1", "c", CheckpointStatus::Completed);
        assert_eq!(fixture.sink.count(event_types::STAGE_SKIPPED, REPORT_STAGE_KEY), 0);

        // Unchanged inputs hydrate the stored synthesis and report.
        let third = orchestrator.run("p1", &context()).await.unwrap();
        assert_eq!(third.report_hash, second.report_hash);
        assert_eq!(third.composite, second.composite);
        assert_eq!(synthesis.calls(), 2);
        assert_eq!(fixture.sink.count(event_types::STAGE_SKIPPED, REPORT_STAGE_KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_failure_degrades_gracefully() {
        let fixture = Fixture::new(panel(&[8.0, 8.0, 8.0]));
        let synthesis = Arc::new(ScriptedSynthesis::failing());
        let orchestrator = fixture.builder().synthesis(synthesis.clone()).build().unwrap();

        let result = orchestrator.run("p1", &context()).await.unwrap();

        assert_eq!(synthesis.calls(), 2);
        assert!(result.synthesis_markdown.is_none());
        assert!(result.report_markdown.contains("_Synthesis unavailable for this run._"));
        assert_eq!(
            fixture.sink.events_of_type(event_types::SYNTHESIS_UNAVAILABLE).len(),
            1
        );
        assert_eq!(result.recommendation(), Recommendation::StrongGo);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_failure_carries_dimensions() {
        let fixture = Fixture::new(panel(&[8.0, 6.0, 4.0]));
        let writer = Arc::new(FailingReportWriter::new());
        let orchestrator = fixture
            .builder()
            .synthesis(Arc::new(ScriptedSynthesis::new("## Synthesis")))
            .report_writer(writer.clone())
            .build()
            .unwrap();

        let err = orchestrator.run("p1", &context()).await.unwrap_err();

        assert_eq!(writer.calls(), 2);
        let dimensions = err.partial_dimensions().unwrap();
        assert_eq!(dimensions.len(), 3);
        assert!((dimensions[1].score - 6.0).abs() < f64::EPSILON);
        match err {
            CheckflowError::ReportFailed {
                source,
                synthesis_markdown,
                ..
            } => {
                assert!(matches!(source, StageError::Exhausted { attempts: 2, .. }));
                assert_eq!(synthesis_markdown.as_deref(), Some("## Synthesis"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fixture.status.current("p1"), Some(ProjectStatus::Error));
        assert_eq!(fixture.sink.events_of_type(event_types::RUN_FAILED).len(), 1);

        // The agent payloads stay checkpointed for a later resume.
        let payload = fixture.backend.get("p1", "agent_0").unwrap().payload;
        assert_eq!(payload["data"]["score"], 8.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_transitions_through_port() {
        let mut status = MockProjectStatusPort::new();
        let mut seq = Sequence::new();
        status
            .expect_set_status()
            .with(eq("p1"), eq(ProjectStatus::Researching))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        status
            .expect_set_status()
            .with(eq("p1"), eq(ProjectStatus::Review))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let fixture = Fixture::new(panel(&[7.0, 7.0]));
        let orchestrator = fixture.builder().status_port(Arc::new(status)).build().unwrap();
        orchestrator.run("p1", &context()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_tracking_and_health() {
        let mut tracker = MockRunTracker::new();
        tracker
            .expect_start_run()
            .times(1)
            .returning(|_, plan| {
                assert_eq!(plan.agents, vec!["agent_0", "agent_1", "agent_2"]);
                Ok("run-42".to_string())
            });
        tracker
            .expect_complete_run()
            .withf(|run_id, summary| {
                run_id == "run-42"
                    && summary.agent_scores.len() == 3
                    && summary.recommendation == Recommendation::ConditionalGo
                    && summary.report_markdown_hash.len() == 64
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let fixture = Fixture::new(vec![
            ScriptedAgent::new("agent_0", "A", 7.0),
            ScriptedAgent::new("agent_1", "B", 7.0).failing_first(1),
            ScriptedAgent::new("agent_2", "C", 7.0),
        ]);
        let orchestrator = fixture.builder().run_tracker(Arc::new(tracker)).build().unwrap();

        let result = orchestrator.run("p1", &context()).await.unwrap();
        assert_eq!(result.pipeline_run_id.as_deref(), Some("run-42"));

        let events = fixture.sink.events();
        assert!(events.iter().all(|e| e.pipeline_run_id.as_deref() == Some("run-42")));

        let health = RunHealth::from_events(&events);
        assert_eq!(health.run_count, 1);
        assert_eq!(health.run_completed, 1);
        assert_eq!(health.stage_failed, 1);
        assert_eq!(health.stage_retried, 1);
        assert!((health.retry_rate - 1.0).abs() < f64::EPSILON);
        assert!(health.avg_runtime_seconds.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_outage_leaves_run_untracked() {
        let mut tracker = MockRunTracker::new();
        tracker
            .expect_start_run()
            .returning(|_, _| Err(crate::errors::StoreError::missing_relation("pipeline_runs")));
        tracker.expect_complete_run().never();

        let fixture = Fixture::new(panel(&[6.0, 6.0]));
        let orchestrator = fixture.builder().run_tracker(Arc::new(tracker)).build().unwrap();

        let result = orchestrator.run("p1", &context()).await.unwrap();
        assert!(result.pipeline_run_id.is_none());
        assert_eq!(result.recommendation(), Recommendation::CautiousProceed);
    }
}
