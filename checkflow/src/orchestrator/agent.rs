//! Collaborator ports for the analysis stages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deadline applied to an agent that does not override [`Agent::timeout`].
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Facts about the project handed to every collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Display name used in reports.
    pub name: String,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ProjectContext {
    /// Creates a context.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: serde_json::Map::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Structured part of an agent result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentData {
    /// Score in `0.0..=10.0`.
    pub score: f64,
    /// Why the score was given.
    pub score_rationale: String,
    /// Anything else the agent reports.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AgentData {
    /// Creates data without extra fields.
    #[must_use]
    pub fn new(score: f64, score_rationale: impl Into<String>) -> Self {
        Self {
            score,
            score_rationale: score_rationale.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Full agent result. Also the checkpoint payload of the agent's stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Structured data.
    pub data: AgentData,
    /// Narrative section for the report.
    pub markdown: String,
}

/// One independent analysis stage.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable stage key.
    fn key(&self) -> &str;

    /// Human-readable name.
    fn label(&self) -> &str;

    /// Dimension this agent scores.
    fn dimension(&self) -> &str;

    /// Deadline for one attempt.
    fn timeout(&self) -> Duration {
        DEFAULT_AGENT_TIMEOUT
    }

    /// Exhaustion leaves the dimension defaulted and logs at warn level.
    fn optional(&self) -> bool {
        false
    }

    /// Runs the analysis.
    async fn run(&self, project_id: &str, context: &ProjectContext) -> anyhow::Result<AgentOutput>;
}

/// Result of an agent stage that completed in this run or a previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedComponent {
    /// Stage key.
    pub key: String,
    /// Human-readable name.
    pub label: String,
    /// Scored dimension.
    pub dimension: String,
    /// The agent's output.
    pub output: AgentOutput,
}
