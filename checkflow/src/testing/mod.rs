//! Testing utilities for checkflow pipelines.
//!
//! This module provides:
//! - Scripted agents, synthesis and report writers with call counters
//! - Backends and sinks that fail on every call
//! - Assertions over recorded telemetry and checkpoints

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_checkpoint_status, assert_event_count, assert_stage_attempts};
pub use fixtures::{FailingCheckpointBackend, FailingEventSink, UnprovisionedCheckpointBackend};
pub use mocks::{FailingReportWriter, ScriptedAgent, ScriptedSynthesis};
