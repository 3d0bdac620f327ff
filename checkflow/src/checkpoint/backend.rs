//! Checkpoint storage backends.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::StageCheckpoint;
use crate::errors::StoreError;

/// Row-store port for checkpoints, keyed by `(project_id, stage_key)`.
///
/// Backends report failures faithfully; deciding what a failure means is
/// left to [`super::CheckpointStore`].
#[async_trait]
pub trait CheckpointBackend: Send + Sync {
    /// Fetches one checkpoint.
    async fn fetch(
        &self,
        project_id: &str,
        stage_key: &str,
    ) -> Result<Option<StageCheckpoint>, StoreError>;

    /// Fetches every checkpoint of a project.
    async fn fetch_all(&self, project_id: &str) -> Result<Vec<StageCheckpoint>, StoreError>;

    /// Inserts or replaces the checkpoint with the record's key.
    async fn upsert(&self, record: StageCheckpoint) -> Result<(), StoreError>;
}

/// In-memory checkpoint backend.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckpointBackend {
    records: Arc<Mutex<HashMap<(String, String), StageCheckpoint>>>,
}

impl InMemoryCheckpointBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a stored record.
    #[must_use]
    pub fn get(&self, project_id: &str, stage_key: &str) -> Option<StageCheckpoint> {
        self.records
            .lock()
            .get(&(project_id.to_string(), stage_key.to_string()))
            .cloned()
    }

    /// Stores a record directly, bypassing the store's merge rules.
    pub fn insert(&self, record: StageCheckpoint) {
        let key = (record.project_id.clone(), record.stage_key.clone());
        self.records.lock().insert(key, record);
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if the backend holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl CheckpointBackend for InMemoryCheckpointBackend {
    async fn fetch(
        &self,
        project_id: &str,
        stage_key: &str,
    ) -> Result<Option<StageCheckpoint>, StoreError> {
        Ok(self.get(project_id, stage_key))
    }

    async fn fetch_all(&self, project_id: &str) -> Result<Vec<StageCheckpoint>, StoreError> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, record: StageCheckpoint) -> Result<(), StoreError> {
        self.insert(record);
        Ok(())
    }
}
