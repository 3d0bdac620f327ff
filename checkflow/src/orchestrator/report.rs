//! Report compilation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use super::{CompletedComponent, ProjectContext};
use crate::scoring::CompositeResult;

/// Stage key of the report stage.
pub const REPORT_STAGE_KEY: &str = "report";

/// Everything a report is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInput {
    /// Project identifier.
    pub project_id: String,
    /// Project facts.
    pub context: ProjectContext,
    /// Composite over every registered dimension.
    pub composite: CompositeResult,
    /// Synthesis narrative, when it completed.
    pub synthesis_markdown: Option<String>,
    /// Completed components in registry order.
    pub components: Vec<CompletedComponent>,
}

/// Renders the final report.
#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Returns the report markdown.
    async fn write(&self, input: &ReportInput) -> anyhow::Result<String>;
}

/// Markdown report: scorecard, synthesis, then each component.
#[derive(Debug, Clone)]
pub struct MarkdownReportWriter {
    title: String,
}

impl Default for MarkdownReportWriter {
    fn default() -> Self {
        Self::new("Validation Report")
    }
}

impl MarkdownReportWriter {
    /// Creates a writer with a report title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Renders synchronously.
    #[must_use]
    pub fn render(&self, input: &ReportInput) -> String {
        let composite = &input.composite;
        let mut out = String::new();

        let _ = writeln!(out, "# {}\n", self.title);
        if !input.context.name.is_empty() {
            let _ = writeln!(out, "**Project:** {}  ", input.context.name);
        }
        let _ = writeln!(out, "**Composite score:** {:.1}/10  ", composite.composite_score);
        let _ = writeln!(out, "**Recommendation:** {}\n", composite.recommendation.label());

        out.push_str("## Scorecard\n\n| Dimension | Score | Rationale |\n|---|---|---|\n");
        for dim in &composite.dimensions {
            let _ = writeln!(
                out,
                "| {} | {:.1} | {} |",
                dim.dimension,
                dim.score,
                dim.rationale.replace('|', "\\|").replace('\n', " ")
            );
        }

        if let Some(reason) = &composite.override_reason {
            let _ = writeln!(out, "\n**Override:** {reason}");
        }
        for condition in &composite.conditions {
            let _ = writeln!(out, "- {condition}");
        }

        out.push_str("\n---\n\n");
        match &input.synthesis_markdown {
            Some(synthesis) => out.push_str(synthesis.trim_end()),
            None => out.push_str("_Synthesis unavailable for this run._"),
        }

        for component in &input.components {
            out.push_str("\n\n---\n\n");
            out.push_str(component.output.markdown.trim_end());
        }
        out.push('\n');
        out
    }
}

#[async_trait]
impl ReportWriter for MarkdownReportWriter {
    async fn write(&self, input: &ReportInput) -> anyhow::Result<String> {
        Ok(self.render(input))
    }
}

/// Lowercase hex SHA-256 of the report markdown.
#[must_use]
pub fn report_hash(markdown: &str) -> String {
    hex::encode(Sha256::digest(markdown.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{AgentData, AgentOutput};
    use crate::scoring::{calculate_program_score, DimensionScore};

    fn component(key: &str, markdown: &str) -> CompletedComponent {
        CompletedComponent {
            key: key.into(),
            label: key.into(),
            dimension: key.into(),
            output: AgentOutput {
                data: AgentData::new(7.0, "ok"),
                markdown: markdown.into(),
            },
        }
    }

    fn input(synthesis: Option<&str>) -> ReportInput {
        let dims = vec![
            DimensionScore::new("Demand", 8.0, "growing | steady"),
            DimensionScore::defaulted("Finance"),
        ];
        ReportInput {
            project_id: "p1".into(),
            context: ProjectContext::new("Welding Certificate"),
            composite: calculate_program_score(&dims),
            synthesis_markdown: synthesis.map(String::from),
            components: vec![component("demand", "## Demand\nStrong."), component("finance", "## Finance")],
        }
    }

    #[test]
    fn test_render_sections_in_order() {
        let report = MarkdownReportWriter::default().render(&input(Some("## Synthesis\nGo.")));

        assert!(report.starts_with("# Validation Report\n"));
        assert!(report.contains("**Project:** Welding Certificate"));
        assert!(report.contains("**Composite score:** 6.5/10"));
        assert!(report.contains("**Recommendation:** Conditional Go"));
        assert!(report.contains("| Demand | 8.0 | growing \\| steady |"));

        let synthesis = report.find("## Synthesis").unwrap();
        let demand = report.find("## Demand").unwrap();
        let finance = report.find("## Finance").unwrap();
        assert!(synthesis < demand && demand < finance);
    }

    #[test]
    fn test_render_without_synthesis() {
        let report = MarkdownReportWriter::new("Brief").render(&input(None));
        assert!(report.contains("_Synthesis unavailable for this run._"));
    }

    #[test]
    fn test_report_hash_is_sha256_hex() {
        assert_eq!(
            report_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(report_hash("a").len(), 64);
    }
}
