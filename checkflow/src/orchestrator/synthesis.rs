//! Cross-component synthesis port.

use async_trait::async_trait;
use std::time::Duration;

use super::{CompletedComponent, ProjectContext};

/// Narrative stage run over every completed component. Always optional.
#[async_trait]
pub trait SynthesisAgent: Send + Sync {
    /// Stage key.
    fn key(&self) -> &str {
        "synthesis"
    }

    /// Human-readable name.
    fn label(&self) -> &str {
        "Synthesis"
    }

    /// Deadline for one attempt.
    fn timeout(&self) -> Duration {
        super::DEFAULT_AGENT_TIMEOUT
    }

    /// Produces the synthesis markdown.
    async fn synthesize(
        &self,
        project_id: &str,
        context: &ProjectContext,
        components: &[CompletedComponent],
    ) -> anyhow::Result<String>;
}
