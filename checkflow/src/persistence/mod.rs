//! Outcome type shared by every best-effort persistence port.
//!
//! Checkpoint, telemetry and run-tracking writes must never abort the
//! computation they describe. Instead of swallowing errors inside the
//! backends, the port wrappers convert them into [`Persisted::Unavailable`]
//! so the caller's decision to carry on is an explicit branch.

use std::fmt;

use tracing::{debug, warn};

use crate::errors::StoreError;

/// Why a persistence call produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// The backing relation does not exist; the feature is switched off.
    NotProvisioned,
    /// The backend failed for another reason.
    Failed(String),
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotProvisioned => write!(f, "not provisioned"),
            Self::Failed(reason) => write!(f, "{reason}"),
        }
    }
}

/// Result of a best-effort persistence call.
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted<T> {
    /// The backend accepted the call.
    Stored(T),
    /// The backend could not serve the call.
    Unavailable(Unavailable),
}

impl<T> Persisted<T> {
    /// Converts a backend result, logging failures at the severity their
    /// cause deserves: a missing relation at debug, anything else at warn.
    pub fn from_result(component: &str, operation: &str, result: Result<T, StoreError>) -> Self {
        match result {
            Ok(value) => Self::Stored(value),
            Err(err) if err.is_missing_relation() => {
                debug!(component, operation, error = %err, "Persistence not provisioned");
                Self::Unavailable(Unavailable::NotProvisioned)
            }
            Err(err) => {
                warn!(component, operation, error = %err, "Persistence call failed (non-fatal)");
                Self::Unavailable(Unavailable::Failed(err.to_string()))
            }
        }
    }

    /// Returns true if the backend accepted the call.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }

    /// Returns the stored value, discarding the failure reason.
    #[must_use]
    pub fn stored(self) -> Option<T> {
        match self {
            Self::Stored(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn unavailable(&self) -> Option<&Unavailable> {
        match self {
            Self::Stored(_) => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }

    /// Returns the stored value or a fallback.
    pub fn unwrap_or(self, fallback: T) -> T {
        match self {
            Self::Stored(value) => value,
            Self::Unavailable(_) => fallback,
        }
    }

    /// Maps the stored value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Persisted<U> {
        match self {
            Self::Stored(value) => Persisted::Stored(f(value)),
            Self::Unavailable(reason) => Persisted::Unavailable(reason),
        }
    }
}

impl<T: Default> Persisted<T> {
    /// Returns the stored value or `T::default()`.
    pub fn unwrap_or_default(self) -> T {
        self.unwrap_or(T::default())
    }
}
