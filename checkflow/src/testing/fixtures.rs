//! Backends and sinks that fail on every call.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::checkpoint::{CheckpointBackend, StageCheckpoint};
use crate::core::RunEvent;
use crate::errors::StoreError;
use crate::telemetry::EventSink;

const CHECKPOINT_RELATION: &str = "pipeline_stage_checkpoints";
const EVENT_RELATION: &str = "pipeline_run_events";

/// Checkpoint backend whose relation was never created.
#[derive(Debug, Default)]
pub struct UnprovisionedCheckpointBackend {
    calls: AtomicUsize,
}

impl UnprovisionedCheckpointBackend {
    /// Number of calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn refuse<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::missing_relation(CHECKPOINT_RELATION))
    }
}

#[async_trait]
impl CheckpointBackend for UnprovisionedCheckpointBackend {
    async fn fetch(&self, _p: &str, _s: &str) -> Result<Option<StageCheckpoint>, StoreError> {
        self.refuse()
    }

    async fn fetch_all(&self, _p: &str) -> Result<Vec<StageCheckpoint>, StoreError> {
        self.refuse()
    }

    async fn upsert(&self, _record: StageCheckpoint) -> Result<(), StoreError> {
        self.refuse()
    }
}

/// Checkpoint backend that fails every call with a fixed message.
#[derive(Debug)]
pub struct FailingCheckpointBackend {
    message: String,
}

impl FailingCheckpointBackend {
    /// Creates the backend.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl CheckpointBackend for FailingCheckpointBackend {
    async fn fetch(&self, _p: &str, _s: &str) -> Result<Option<StageCheckpoint>, StoreError> {
        Err(StoreError::backend(self.message.clone()))
    }

    async fn fetch_all(&self, _p: &str) -> Result<Vec<StageCheckpoint>, StoreError> {
        Err(StoreError::backend(self.message.clone()))
    }

    async fn upsert(&self, _record: StageCheckpoint) -> Result<(), StoreError> {
        Err(StoreError::backend(self.message.clone()))
    }
}

/// Event sink that fails every append.
#[derive(Debug)]
pub struct FailingEventSink {
    error: StoreError,
    attempts: AtomicUsize,
}

impl FailingEventSink {
    /// Fails with a generic backend error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: StoreError::backend(message),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Fails as if the events relation does not exist.
    #[must_use]
    pub fn missing_relation() -> Self {
        Self {
            error: StoreError::missing_relation(EVENT_RELATION),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of append attempts.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for FailingEventSink {
    async fn append(&self, _event: &RunEvent) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}
