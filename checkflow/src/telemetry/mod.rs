//! Append-only run telemetry.
//!
//! This module provides the event sink infrastructure the runner and
//! orchestrator write every state transition to, plus a reliability
//! summary computed from the resulting trail.

mod health;
mod log;
mod sink;

pub use health::{percentile, RunHealth, RUNTIME_SECONDS_KEY};
pub use log::TelemetryLog;
pub use sink::{EventSink, InMemoryEventSink, JsonlEventSink, NoOpEventSink, TracingEventSink};
