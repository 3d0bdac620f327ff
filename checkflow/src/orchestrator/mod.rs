//! Multi-stage orchestration.
//!
//! A run fans out every registered [`Agent`] concurrently and waits for
//! all of them to settle. If enough completed, an optional
//! [`SynthesisAgent`] stage and the required report stage follow. Agents
//! that did not complete contribute a defaulted dimension score.

mod agent;
mod builder;
mod ports;
mod report;
mod run;
mod synthesis;

#[cfg(test)]
mod integration_tests;

pub use agent::{
    Agent, AgentData, AgentOutput, CompletedComponent, ProjectContext, DEFAULT_AGENT_TIMEOUT,
};
pub use builder::OrchestratorBuilder;
pub use ports::{
    InMemoryProjectStatus, InMemoryRunTracker, NoOpProjectStatus, ProjectStatusPort, RunPlan,
    RunSummary, RunTracker,
};
#[cfg(test)]
pub use ports::{MockProjectStatusPort, MockRunTracker};
pub use report::{report_hash, MarkdownReportWriter, ReportInput, ReportWriter, REPORT_STAGE_KEY};
pub use run::{Orchestrator, RunResult};
pub use synthesis::SynthesisAgent;
