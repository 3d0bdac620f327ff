//! Checkpoint store with the resume merge rules.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CheckpointBackend, InMemoryCheckpointBackend, StageCheckpoint, StartMark};
use crate::core::CheckpointStatus;
use crate::persistence::Persisted;

const COMPONENT: &str = "checkpoints";

/// Best-effort checkpoint store.
///
/// Every call returns a [`Persisted`] outcome instead of an error. A run
/// that cannot reach its checkpoints behaves as if nothing was ever
/// checkpointed.
///
/// Each mutation reads the existing record and upserts the merged one.
/// Two processes writing the same `(project, stage)` key concurrently can
/// interleave; callers must not trigger duplicate runs for one project.
#[derive(Clone)]
pub struct CheckpointStore {
    backend: Arc<dyn CheckpointBackend>,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore").finish_non_exhaustive()
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CheckpointStore {
    /// Creates a store over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn CheckpointBackend>) -> Self {
        Self { backend }
    }

    /// Creates a store over a fresh in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCheckpointBackend::new()))
    }

    /// Loads every checkpoint of a project, keyed by stage.
    pub async fn load_all(&self, project_id: &str) -> Persisted<HashMap<String, StageCheckpoint>> {
        let result = self.backend.fetch_all(project_id).await;
        Persisted::from_result(COMPONENT, "load_all", result).map(|records| {
            records
                .into_iter()
                .map(|r| (r.stage_key.clone(), r))
                .collect()
        })
    }

    /// Loads one checkpoint.
    pub async fn load(&self, project_id: &str, stage_key: &str) -> Persisted<Option<StageCheckpoint>> {
        let result = self.backend.fetch(project_id, stage_key).await;
        Persisted::from_result(COMPONENT, "load", result)
    }

    /// Marks an attempt as started. A completed checkpoint is left as is.
    pub async fn mark_started(
        &self,
        project_id: &str,
        stage_key: &str,
        attempt: u32,
    ) -> Persisted<StartMark> {
        let existing = match self.load(project_id, stage_key).await {
            Persisted::Stored(existing) => existing,
            Persisted::Unavailable(reason) => return Persisted::Unavailable(reason),
        };

        let Some(record) =
            StageCheckpoint::started(existing.as_ref(), project_id, stage_key, attempt, Utc::now())
        else {
            return Persisted::Stored(StartMark::AlreadyCompleted);
        };

        let result = self.backend.upsert(record).await;
        Persisted::from_result(COMPONENT, "mark_started", result).map(|()| StartMark::Started)
    }

    /// Marks a stage completed with its result payload.
    pub async fn mark_completed(
        &self,
        project_id: &str,
        stage_key: &str,
        payload: serde_json::Value,
        duration_ms: u64,
    ) -> Persisted<()> {
        // An unreadable prior record is not a reason to lose the result.
        let existing = self.load(project_id, stage_key).await.stored().flatten();
        let record = StageCheckpoint::completed(
            existing.as_ref(),
            project_id,
            stage_key,
            payload,
            duration_ms,
            Utc::now(),
        );
        let result = self.backend.upsert(record).await;
        Persisted::from_result(COMPONENT, "mark_completed", result)
    }

    /// Marks an attempt failed, keeping any stored payload.
    pub async fn mark_failed(
        &self,
        project_id: &str,
        stage_key: &str,
        error: &str,
        duration_ms: u64,
    ) -> Persisted<()> {
        let existing = match self.load(project_id, stage_key).await {
            Persisted::Stored(existing) => existing,
            Persisted::Unavailable(reason) => return Persisted::Unavailable(reason),
        };
        let record = StageCheckpoint::failed(
            existing.as_ref(),
            project_id,
            stage_key,
            error,
            duration_ms,
            Utc::now(),
        );
        let result = self.backend.upsert(record).await;
        Persisted::from_result(COMPONENT, "mark_failed", result)
    }

    /// Returns true iff the stored status is `completed`. Unreachable
    /// storage reads as "not completed" so the stage runs.
    pub async fn should_skip(&self, project_id: &str, stage_key: &str) -> bool {
        self.load(project_id, stage_key)
            .await
            .stored()
            .flatten()
            .is_some_and(|r| r.status == CheckpointStatus::Completed)
    }

    /// Returns the payload of a completed checkpoint.
    pub async fn completed_payload(
        &self,
        project_id: &str,
        stage_key: &str,
    ) -> Option<serde_json::Value> {
        self.load(project_id, stage_key)
            .await
            .stored()
            .flatten()
            .filter(|r| r.status == CheckpointStatus::Completed && r.has_payload())
            .map(|r| r.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Unavailable;
    use crate::testing::UnprovisionedCheckpointBackend;
    use serde_json::json;

    fn store() -> (CheckpointStore, InMemoryCheckpointBackend) {
        let backend = InMemoryCheckpointBackend::new();
        (CheckpointStore::new(Arc::new(backend.clone())), backend)
    }

    #[tokio::test]
    async fn test_started_then_completed() {
        let (store, backend) = store();
        assert_eq!(store.mark_started("p", "s", 1).await, Persisted::Stored(StartMark::Started));
        assert_eq!(backend.get("p", "s").unwrap().status, CheckpointStatus::InProgress);
        assert!(!store.should_skip("p", "s").await);

        store.mark_completed("p", "s", json!({"v": 1}), 40).await;
        assert!(store.should_skip("p", "s").await);
        assert_eq!(store.completed_payload("p", "s").await, Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn test_mark_started_never_regresses_completed() {
        let (store, backend) = store();
        store.mark_completed("p", "s", json!({"v": 1}), 40).await;

        let mark = store.mark_started("p", "s", 2).await;
        assert_eq!(mark, Persisted::Stored(StartMark::AlreadyCompleted));
        assert_eq!(backend.get("p", "s").unwrap().status, CheckpointStatus::Completed);
    }

    #[tokio::test]
    async fn test_attempts_are_max_merged() {
        let (store, backend) = store();
        store.mark_started("p", "s", 2).await;
        store.mark_failed("p", "s", "boom", 10).await;
        store.mark_started("p", "s", 1).await;
        assert_eq!(backend.get("p", "s").unwrap().attempts, 2);

        store.mark_completed("p", "s", json!({}), 10).await;
        assert_eq!(backend.get("p", "s").unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_failed_retry_keeps_prior_payload() {
        let (store, backend) = store();
        let mut prior = StageCheckpoint::completed(None, "p", "s", json!({"partial": true}), 1, Utc::now());
        prior.status = CheckpointStatus::Failed;
        backend.insert(prior);

        store.mark_started("p", "s", 1).await;
        store.mark_failed("p", "s", "timeout", 100).await;

        let record = backend.get("p", "s").unwrap();
        assert_eq!(record.payload, json!({"partial": true}));
        assert_eq!(record.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_completed_payload_requires_content() {
        let (store, _) = store();
        store.mark_completed("p", "s", json!({}), 1).await;
        assert!(store.should_skip("p", "s").await);
        assert!(store.completed_payload("p", "s").await.is_none());
    }

    #[tokio::test]
    async fn test_load_all_keys_by_stage() {
        let (store, _) = store();
        store.mark_started("p", "a", 1).await;
        store.mark_completed("p", "b", json!({"x": 1}), 1).await;

        let all = store.load_all("p").await.stored().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["b"].status, CheckpointStatus::Completed);
    }

    #[tokio::test]
    async fn test_unprovisioned_backend_degrades() {
        let store = CheckpointStore::new(Arc::new(UnprovisionedCheckpointBackend::default()));

        assert_eq!(
            store.mark_started("p", "s", 1).await.unavailable(),
            Some(&Unavailable::NotProvisioned)
        );
        assert!(!store.mark_completed("p", "s", json!({"v": 1}), 1).await.is_stored());
        assert!(!store.should_skip("p", "s").await);
        assert!(store.load_all("p").await.unwrap_or_default().is_empty());
    }
}
