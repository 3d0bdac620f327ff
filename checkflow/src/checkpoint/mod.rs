//! Durable per-stage checkpoints.
//!
//! This module provides:
//! - The checkpoint record and its merge rules
//! - The backend port with in-memory and JSON-file implementations
//! - [`CheckpointStore`], the best-effort wrapper the runner talks to

mod backend;
mod file;
mod record;
mod store;

pub use backend::{CheckpointBackend, InMemoryCheckpointBackend};
pub use file::JsonFileCheckpointBackend;
pub use record::{StageCheckpoint, StartMark};
pub use store::CheckpointStore;
