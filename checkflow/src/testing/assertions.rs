//! Assertions over recorded telemetry and checkpoints.

use crate::checkpoint::InMemoryCheckpointBackend;
use crate::core::{event_types, CheckpointStatus};
use crate::telemetry::InMemoryEventSink;

/// Asserts how many events of `event_type` were recorded for `stage_key`.
pub fn assert_event_count(sink: &InMemoryEventSink, event_type: &str, stage_key: &str, expected: usize) {
    let actual = sink.count(event_type, stage_key);
    assert_eq!(
        actual, expected,
        "Expected {expected} '{event_type}' events for '{stage_key}', got {actual}"
    );
}

/// Asserts how many attempts a stage started.
pub fn assert_stage_attempts(sink: &InMemoryEventSink, stage_key: &str, expected: usize) {
    assert_event_count(sink, event_types::STAGE_STARTED, stage_key, expected);
}

/// Asserts the stored status of a checkpoint.
pub fn assert_checkpoint_status(
    backend: &InMemoryCheckpointBackend,
    project_id: &str,
    stage_key: &str,
    expected: CheckpointStatus,
) {
    let record = backend.get(project_id, stage_key);
    assert_eq!(
        record.as_ref().map(|r| r.status),
        Some(expected),
        "Unexpected checkpoint for ({project_id}, {stage_key}): {record:?}"
    );
}
