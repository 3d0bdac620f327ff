//! File-backed checkpoint backend.
//!
//! Each project's checkpoints live in one JSON document under a root
//! directory, named by the SHA-256 of the project id. Writes go to a temporary file that is renamed over the
//! current document, so a crash mid-write leaves the previous document intact.
//! The root directory plays the role of the table: if it does not exist,
//! every call reports a missing relation and checkpointing is disabled.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

use super::{CheckpointBackend, StageCheckpoint};
use crate::errors::StoreError;

/// Checkpoint backend storing one JSON document per project.
#[derive(Debug)]
pub struct JsonFileCheckpointBackend {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileCheckpointBackend {
    /// Creates a backend rooted at `root`. The directory is not created.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_path(&self, project_id: &str) -> PathBuf {
        let file_stem = hex::encode(Sha256::digest(project_id.as_bytes()));
        self.root.join(format!("{file_stem}.json"))
    }

    async fn ensure_root(&self) -> Result<(), StoreError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(StoreError::missing_relation(&self.root.display().to_string())),
        }
    }

    async fn read_project(
        &self,
        project_id: &str,
    ) -> Result<BTreeMap<String, StageCheckpoint>, StoreError> {
        self.ensure_root().await?;
        let path = self.project_path(project_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mut records: BTreeMap<String, StageCheckpoint> = serde_json::from_slice(&bytes)?;
                records.retain(|_, record| {
                    let owned = record.project_id == project_id;
                    if !owned {
                        warn!(
                            path = %path.display(),
                            expected = project_id,
                            found = %record.project_id,
                            "Ignoring checkpoint owned by another project"
                        );
                    }
                    owned
                });
                Ok(records)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CheckpointBackend for JsonFileCheckpointBackend {
    async fn fetch(
        &self,
        project_id: &str,
        stage_key: &str,
    ) -> Result<Option<StageCheckpoint>, StoreError> {
        Ok(self.read_project(project_id).await?.remove(stage_key))
    }

    async fn fetch_all(&self, project_id: &str) -> Result<Vec<StageCheckpoint>, StoreError> {
        Ok(self.read_project(project_id).await?.into_values().collect())
    }

    async fn upsert(&self, record: StageCheckpoint) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read_project(&record.project_id).await?;
        let path = self.project_path(&record.project_id);
        records.insert(record.stage_key.clone(), record);

        let bytes = serde_json::to_vec_pretty(&records)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
