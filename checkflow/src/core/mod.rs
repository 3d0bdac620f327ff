//! Core domain model types for checkflow.
//!
//! This module contains the fundamental types shared by every component:
//! - Checkpoint, event-level and project status enums
//! - The append-only run event

mod event;
mod status;

pub use event::{event_types, RunEvent};
pub use status::{CheckpointStatus, EventLevel, ProjectStatus};
