//! Event sink trait and implementations.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::core::{EventLevel, RunEvent};
use crate::errors::StoreError;

/// Append-only destination for run events.
///
/// Sinks report failures; [`super::TelemetryLog`] makes sure those
/// failures never reach the pipeline.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Appends one event.
    async fn append(&self, event: &RunEvent) -> Result<(), StoreError>;
}

/// A no-op event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn append(&self, _event: &RunEvent) -> Result<(), StoreError> {
        Ok(())
    }
}

/// An event sink that writes events to the tracing log at their own level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn append(&self, event: &RunEvent) -> Result<(), StoreError> {
        let stage = event.stage_key.as_deref().unwrap_or("-");
        let run = event.pipeline_run_id.as_deref().unwrap_or("-");
        let metadata = serde_json::Value::Object(event.metadata.clone());
        match event.level {
            EventLevel::Debug => debug!(event_type = %event.event_type, stage, run, %metadata, "{}", event.message),
            EventLevel::Info => info!(event_type = %event.event_type, stage, run, %metadata, "{}", event.message),
            EventLevel::Warn => warn!(event_type = %event.event_type, stage, run, %metadata, "{}", event.message),
            EventLevel::Error => error!(event_type = %event.event_type, stage, run, %metadata, "{}", event.message),
        }
        Ok(())
    }
}

/// A collecting event sink, mostly for tests and health summaries.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: parking_lot::RwLock<Vec<RunEvent>>,
}

impl InMemoryEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events of one type.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Returns events about one stage.
    #[must_use]
    pub fn events_for_stage(&self, stage_key: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.is_for_stage(stage_key))
            .cloned()
            .collect()
    }

    /// Counts events of one type about one stage.
    #[must_use]
    pub fn count(&self, event_type: &str, stage_key: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type && e.is_for_stage(stage_key))
            .count()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn append(&self, event: &RunEvent) -> Result<(), StoreError> {
        self.events.write().push(event.clone());
        Ok(())
    }
}

/// Appends events as JSON Lines to a file.
///
/// The parent directory must already exist; otherwise the sink reports a
/// missing relation and telemetry is silently disabled.
#[derive(Debug)]
pub struct JsonlEventSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlEventSink {
    /// Creates a sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every event written so far. Unparsable lines are skipped.
    pub async fn read_events(&self) -> Result<Vec<RunEvent>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn append(&self, event: &RunEvent) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !tokio::fs::try_exists(parent).await.unwrap_or(false) {
                return Err(StoreError::missing_relation(&parent.display().to_string()));
            }
        }

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
