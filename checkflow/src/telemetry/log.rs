//! The never-failing telemetry front end.

use std::sync::Arc;

use super::{EventSink, NoOpEventSink};
use crate::core::RunEvent;
use crate::persistence::Persisted;

/// Append-only event log in front of an [`EventSink`].
///
/// `log_run_event` makes exactly one append attempt. Whatever the sink
/// does, the caller gets an outcome value back and carries on.
#[derive(Clone)]
pub struct TelemetryLog {
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for TelemetryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryLog").finish_non_exhaustive()
    }
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TelemetryLog {
    /// Creates a log over a sink.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Creates a log that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoOpEventSink))
    }

    /// Appends one event.
    pub async fn log_run_event(&self, event: RunEvent) -> Persisted<()> {
        let result = self.sink.append(&event).await;
        Persisted::from_result("telemetry", &event.event_type, result)
    }
}
