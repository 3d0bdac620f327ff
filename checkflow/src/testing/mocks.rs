//! Scripted collaborators for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use crate::orchestrator::{
    Agent, AgentData, AgentOutput, CompletedComponent, ProjectContext, ReportInput, ReportWriter,
    SynthesisAgent,
};

const SCRIPTED_TIMEOUT: Duration = Duration::from_secs(30);

/// An agent that hangs, then fails, then succeeds, in that order.
///
/// Hanging calls sleep for four times the agent's timeout, so the runner
/// abandons them.
#[derive(Debug)]
pub struct ScriptedAgent {
    key: String,
    label: String,
    dimension: String,
    score: f64,
    timeout: Duration,
    optional: bool,
    hangs: u32,
    failures: u32,
    calls: AtomicU32,
}

impl ScriptedAgent {
    /// Creates an agent that always succeeds with `score`.
    #[must_use]
    pub fn new(key: impl Into<String>, dimension: impl Into<String>, score: f64) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            dimension: dimension.into(),
            score,
            timeout: SCRIPTED_TIMEOUT,
            optional: false,
            hangs: 0,
            failures: 0,
            calls: AtomicU32::new(0),
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the per-attempt deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Marks the agent optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Makes the first `n` calls outlive the deadline.
    #[must_use]
    pub fn hanging_first(mut self, n: u32) -> Self {
        self.hangs = n;
        self
    }

    /// Makes the `n` calls after any hanging ones fail.
    #[must_use]
    pub fn failing_first(mut self, n: u32) -> Self {
        self.failures = n;
        self
    }

    /// Makes every call fail.
    #[must_use]
    pub fn always_failing(self) -> Self {
        self.failing_first(u32::MAX)
    }

    /// Number of times `run` was invoked.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The output a successful call returns.
    #[must_use]
    pub fn expected_output(&self) -> AgentOutput {
        AgentOutput {
            data: AgentData::new(self.score, format!("{} scripted rationale", self.label)),
            markdown: format!("## {}\n\nScored {}/10.", self.label, self.score),
        }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn key(&self) -> &str {
        &self.key
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn dimension(&self) -> &str {
        &self.dimension
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn optional(&self) -> bool {
        self.optional
    }

    async fn run(&self, _project_id: &str, _context: &ProjectContext) -> anyhow::Result<AgentOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.hangs {
            tokio::time::sleep(self.timeout * 4).await;
        } else if call <= self.hangs.saturating_add(self.failures) {
            anyhow::bail!("{} scripted failure on call {call}", self.key);
        }
        Ok(self.expected_output())
    }
}

/// A synthesis stage returning fixed markdown, or failing.
#[derive(Debug)]
pub struct ScriptedSynthesis {
    markdown: Option<String>,
    calls: AtomicU32,
    components_seen: AtomicUsize,
}

impl ScriptedSynthesis {
    /// Creates a synthesis that succeeds with `markdown`.
    #[must_use]
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: Some(markdown.into()),
            calls: AtomicU32::new(0),
            components_seen: AtomicUsize::new(0),
        }
    }

    /// Creates a synthesis that always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            markdown: None,
            calls: AtomicU32::new(0),
            components_seen: AtomicUsize::new(0),
        }
    }

    /// Number of times `synthesize` was invoked.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Components passed to the latest call.
    #[must_use]
    pub fn components_seen(&self) -> usize {
        self.components_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisAgent for ScriptedSynthesis {
    async fn synthesize(
        &self,
        _project_id: &str,
        _context: &ProjectContext,
        components: &[CompletedComponent],
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.components_seen.store(components.len(), Ordering::SeqCst);
        match &self.markdown {
            Some(markdown) => Ok(markdown.clone()),
            None => anyhow::bail!("synthesis model unavailable"),
        }
    }
}

/// A report writer that always fails.
#[derive(Debug, Default)]
pub struct FailingReportWriter {
    calls: AtomicU32,
}

impl FailingReportWriter {
    /// Creates the writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `write` was invoked.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportWriter for FailingReportWriter {
    async fn write(&self, _input: &ReportInput) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("renderer crashed")
    }
}
