//! Deadline race for stage work.
//!
//! The work runs as its own task. If the deadline passes first, the task
//! handle is dropped, which detaches the task rather than aborting it:
//! in-flight I/O may still finish, but its result goes nowhere.

use std::future::Future;
use std::time::Duration;

use crate::errors::StageError;

/// Result of a timed operation.
#[derive(Debug)]
pub enum TimedResult<T, E> {
    /// Operation completed successfully.
    Ok(T),
    /// Operation failed with an error.
    Err(E),
    /// The task panicked or was cancelled by the runtime.
    Aborted(String),
    /// Operation timed out.
    Timeout,
}

impl<T, E> TimedResult<T, E> {
    /// Returns true if the operation succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true if the operation timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl<T> TimedResult<T, anyhow::Error> {
    /// Converts into a stage result for the stage called `label`.
    pub fn into_stage_result(self, label: &str, deadline: Duration) -> Result<T, StageError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Err(err) => Err(StageError::failed(label, format!("{err:#}"))),
            Self::Aborted(message) => Err(StageError::Aborted {
                label: label.to_string(),
                message,
            }),
            Self::Timeout => Err(StageError::timeout(
                label,
                u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }
}

/// Runs `work` on its own task and races it against `deadline`.
pub async fn race_deadline<T, F>(deadline: Duration, work: F) -> TimedResult<T, anyhow::Error>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let handle = tokio::spawn(work);
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(Ok(value))) => TimedResult::Ok(value),
        Ok(Ok(Err(err))) => TimedResult::Err(err),
        Ok(Err(join_err)) => TimedResult::Aborted(join_err.to_string()),
        Err(_) => TimedResult::Timeout,
    }
}
