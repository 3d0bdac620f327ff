//! # Checkflow
//!
//! Checkpointed stage orchestration with bounded retries, best-effort
//! telemetry and composite scoring.
//!
//! A run fans out one stage per registered agent, waits for every stage to
//! settle, and continues only when enough of them completed. Completed
//! stages are checkpointed, so a re-run of the same project skips straight
//! past them. The surviving per-dimension scores are aggregated into a
//! composite score and a recommendation tier, and a report is compiled.
//!
//! - **Stage execution**: per-attempt deadlines, linear backoff, an attempt
//!   ledger shared across the run ([`runner`])
//! - **Resumability**: durable per-stage checkpoints with monotonic merge
//!   rules ([`checkpoint`])
//! - **Telemetry**: append-only run events that never fail a run
//!   ([`telemetry`])
//! - **Scoring**: weighted composite, recommendation tiers, optional guard
//!   rules ([`scoring`])
//! - **Run queue**: one active job per order, claimed by compare-and-set
//!   ([`queue`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use checkflow::prelude::*;
//!
//! let orchestrator = Orchestrator::builder()
//!     .agent(Arc::new(LaborMarketAgent::new(client)))
//!     .agent(Arc::new(FinancialAgent::new(client)))
//!     .synthesis(Arc::new(NarrativeAgent::new(client)))
//!     .checkpoints(CheckpointStore::new(Arc::new(JsonFileCheckpointBackend::new("state"))))
//!     .settings(PipelineSettings::from_env()?)
//!     .build()?;
//!
//! let result = orchestrator.run("project-1", &ProjectContext::new("Welding")).await?;
//! println!("{} {}", result.composite_score(), result.recommendation());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod errors;
pub mod observability;
pub mod orchestrator;
pub mod persistence;
pub mod queue;
pub mod ratelimit;
pub mod runner;
pub mod scoring;
pub mod telemetry;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{
        CheckpointBackend, CheckpointStore, InMemoryCheckpointBackend, JsonFileCheckpointBackend,
        StageCheckpoint,
    };
    pub use crate::config::PipelineSettings;
    pub use crate::core::{event_types, CheckpointStatus, EventLevel, ProjectStatus, RunEvent};
    pub use crate::errors::{
        CheckflowError, ConfigError, InsufficientSuccessError, ScoringError, StageError,
        StoreError,
    };
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::orchestrator::{
        Agent, AgentData, AgentOutput, CompletedComponent, MarkdownReportWriter, Orchestrator,
        OrchestratorBuilder, ProjectContext, ProjectStatusPort, ReportWriter, RunResult,
        RunTracker, SynthesisAgent,
    };
    pub use crate::persistence::{Persisted, Unavailable};
    pub use crate::queue::{
        process_next_run_job, InMemoryRunQueue, ProcessOutcome, RunJob, RunJobRequest,
        RunJobStatus, RunQueue,
    };
    pub use crate::ratelimit::{RateLimitConfig, RateLimiter};
    pub use crate::runner::{RetryPolicy, StageConfig, StageResult, StageRunner};
    pub use crate::scoring::{
        calculate_program_score, CompositeResult, DimensionScore, GuardRules, Recommendation,
        ScoreAggregator, WeightingPolicy,
    };
    pub use crate::telemetry::{EventSink, JsonlEventSink, RunHealth, TelemetryLog};
}
