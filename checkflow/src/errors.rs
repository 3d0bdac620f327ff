//! Error types for the checkflow engine.
//!
//! The taxonomy mirrors how failures travel through a run:
//!
//! - [`StageError`] covers transient stage failures (timeouts, collaborator
//!   errors) and the exhausted-retry outcome.
//! - [`StoreError`] is an infrastructure failure from a checkpoint, telemetry
//!   or run-tracking backend. It never escapes the persistence layer.
//! - [`InsufficientSuccessError`] aborts a run whose fan-out produced too few
//!   completed stages.
//! - [`CheckflowError`] is what the orchestrator hands back to callers.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::DimensionScore;

/// The main error type for checkflow operations.
#[derive(Debug, Error)]
pub enum CheckflowError {
    /// A required stage failed after exhausting its attempts.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// Too few independent stages completed for a trustworthy result.
    #[error("{0}")]
    InsufficientSuccess(#[from] InsufficientSuccessError),

    /// The required report stage failed. The per-dimension data gathered
    /// before the failure is carried along so callers can still inspect it.
    #[error("Report stage failed: {source}")]
    ReportFailed {
        /// The underlying stage failure.
        source: StageError,
        /// Dimension scores assembled before the report stage ran.
        dimensions: Vec<DimensionScore>,
        /// Synthesis narrative, if the synthesis stage produced one.
        synthesis_markdown: Option<String>,
    },

    /// Score aggregation rejected its input.
    #[error("{0}")]
    Scoring(#[from] ScoringError),

    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckflowError {
    /// Returns the dimension scores that survived a failed run, if any.
    #[must_use]
    pub fn partial_dimensions(&self) -> Option<&[DimensionScore]> {
        match self {
            Self::ReportFailed { dimensions, .. } => Some(dimensions),
            _ => None,
        }
    }
}

/// Failure of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The stage did not finish before its deadline.
    #[error("{label} timed out after {timeout_ms}ms")]
    Timeout {
        /// Human-readable stage label.
        label: String,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The stage work returned an error.
    #[error("{label} failed: {message}")]
    Failed {
        /// Human-readable stage label.
        label: String,
        /// The collaborator's error message.
        message: String,
    },

    /// The stage task panicked or was torn down by the runtime.
    #[error("{label} aborted: {message}")]
    Aborted {
        /// Human-readable stage label.
        label: String,
        /// Join error description.
        message: String,
    },

    /// Every permitted attempt failed.
    #[error("{label} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Stage key.
        stage_key: String,
        /// Human-readable stage label.
        label: String,
        /// Attempts consumed by this stage in the current run.
        attempts: u32,
        /// Message of the final failure.
        last_error: String,
    },
}

impl StageError {
    /// Creates a failure from a collaborator error.
    #[must_use]
    pub fn failed(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            label: label.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(label: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            label: label.into(),
            timeout_ms,
        }
    }

    /// Returns true if another attempt could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Failed { .. } | Self::Aborted { .. })
    }

    /// Returns true if retries were exhausted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Raised when fewer stages completed than the run requires.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Insufficient stages completed ({succeeded}/{total}, {required} required)")]
pub struct InsufficientSuccessError {
    /// Stages that completed or were restored from a checkpoint.
    pub succeeded: usize,
    /// Minimum required.
    pub required: usize,
    /// Registered stages.
    pub total: usize,
    /// Keys of the stages that did not complete.
    pub failed_stages: Vec<String>,
}

/// Postgres error code for an undefined table.
pub const UNDEFINED_TABLE_CODE: &str = "42P01";

fn missing_relation_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)(does not exist|\brelation\b|no such table)").ok())
        .as_ref()
}

/// Failure reported by a persistence backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend rejected the operation.
    #[error("{message}")]
    Backend {
        /// Backend-specific error code, when one exists.
        code: Option<String>,
        /// The error message.
        message: String,
    },

    /// Filesystem failure in a file-backed store.
    #[error("IO error: {0}")]
    Io(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Creates a backend error without a code.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a backend error carrying a code.
    #[must_use]
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Creates the error a backend returns when its table is absent.
    #[must_use]
    pub fn missing_relation(relation: &str) -> Self {
        Self::with_code(
            UNDEFINED_TABLE_CODE,
            format!("relation \"{relation}\" does not exist"),
        )
    }

    /// Returns true if the error means the backing relation was never
    /// provisioned.
    #[must_use]
    pub fn is_missing_relation(&self) -> bool {
        match self {
            Self::Backend { code, message } => {
                code.as_deref() == Some(UNDEFINED_TABLE_CODE)
                    || missing_relation_pattern().is_some_and(|re| re.is_match(message))
            }
            Self::Io(_) | Self::Serialization(_) => false,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised while aggregating dimension scores.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// A dimension has no entry in the weighting table.
    #[error("Unknown dimension: {dimension}. Valid dimensions: {}", known.join(", "))]
    UnknownDimension {
        /// The unweighted dimension.
        dimension: String,
        /// Dimensions present in the table.
        known: Vec<String>,
    },

    /// A weight is negative or not a finite number.
    #[error("Invalid weight {weight} for dimension {dimension}")]
    InvalidWeight {
        /// The dimension.
        dimension: String,
        /// The rejected weight.
        weight: f64,
    },

    /// All applicable weights sum to zero.
    #[error("Weights for the supplied dimensions sum to zero")]
    ZeroTotalWeight,
}

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// The variable name.
        key: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two stages share a key.
    #[error("Duplicate stage key '{key}'")]
    DuplicateStageKey {
        /// The repeated key.
        key: String,
    },

    /// The success threshold can never be met.
    #[error("MIN_REQUIRED_SUCCESSES ({required}) exceeds the {total} registered stages")]
    UnreachableThreshold {
        /// Configured threshold.
        required: usize,
        /// Registered stages.
        total: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_relation_by_code() {
        let err = StoreError::with_code("42P01", "undefined table");
        assert!(err.is_missing_relation());
    }

    #[test]
    fn test_missing_relation_by_message() {
        let err = StoreError::backend("relation \"validation_checkpoints\" does not exist");
        assert!(err.is_missing_relation());

        let err = StoreError::backend("Relation missing");
        assert!(err.is_missing_relation());
    }

    #[test]
    fn test_other_backend_errors_are_not_missing_relation() {
        assert!(!StoreError::backend("connection reset by peer").is_missing_relation());
        assert!(!StoreError::Io("does not exist".to_string()).is_missing_relation());
    }

    #[test]
    fn test_stage_error_classification() {
        assert!(StageError::timeout("Market", 10).is_transient());
        assert!(StageError::failed("Market", "boom").is_transient());

        let exhausted = StageError::Exhausted {
            stage_key: "market".to_string(),
            label: "Market".to_string(),
            attempts: 2,
            last_error: "boom".to_string(),
        };
        assert!(exhausted.is_exhausted());
        assert!(!exhausted.is_transient());
        assert_eq!(exhausted.to_string(), "Market failed after 2 attempts: boom");
    }

    #[test]
    fn test_timeout_message() {
        let err = StageError::timeout("Labor Market Analysis", 1500);
        assert_eq!(err.to_string(), "Labor Market Analysis timed out after 1500ms");
    }

    #[test]
    fn test_insufficient_success_message() {
        let err = InsufficientSuccessError {
            succeeded: 3,
            required: 4,
            total: 7,
            failed_stages: vec!["a".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stages completed (3/7, 4 required)"
        );
    }

    #[test]
    fn test_partial_dimensions_only_on_report_failure() {
        let err = CheckflowError::ReportFailed {
            source: StageError::failed("Report", "renderer offline"),
            dimensions: vec![DimensionScore::new("Demand", 7.0, "solid")],
            synthesis_markdown: None,
        };
        assert_eq!(err.partial_dimensions().map(<[_]>::len), Some(1));

        let err = CheckflowError::Internal("x".to_string());
        assert!(err.partial_dimensions().is_none());
    }

    #[test]
    fn test_unknown_dimension_lists_known() {
        let err = ScoringError::UnknownDimension {
            dimension: "Vibes".to_string(),
            known: vec!["Demand".to_string(), "Cost".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown dimension: Vibes. Valid dimensions: Demand, Cost"
        );
    }
}
