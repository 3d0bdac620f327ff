//! Per-dimension scores.

use serde::{Deserialize, Serialize};

/// Lowest possible score.
pub const MIN_SCORE: f64 = 0.0;

/// Highest possible score.
pub const MAX_SCORE: f64 = 10.0;

/// Score given to a dimension whose stage never completed.
pub const DEFAULT_SCORE: f64 = 5.0;

/// Rationale attached to a defaulted dimension.
pub const DEFAULT_RATIONALE: &str = "default score — component incomplete";

/// One dimension's contribution to the composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// Dimension name.
    pub dimension: String,
    /// Score in `0.0..=10.0`.
    pub score: f64,
    /// Why the score was given.
    pub rationale: String,
}

impl DimensionScore {
    /// Creates a score, clamped into range. A non-finite score becomes
    /// [`DEFAULT_SCORE`].
    #[must_use]
    pub fn new(dimension: impl Into<String>, score: f64, rationale: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            score: clamp_score(score),
            rationale: rationale.into(),
        }
    }

    /// Placeholder for a dimension whose stage did not complete.
    #[must_use]
    pub fn defaulted(dimension: impl Into<String>) -> Self {
        Self::new(dimension, DEFAULT_SCORE, DEFAULT_RATIONALE)
    }

    /// Returns true for a placeholder score.
    #[must_use]
    pub fn is_defaulted(&self) -> bool {
        self.rationale == DEFAULT_RATIONALE
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(MIN_SCORE, MAX_SCORE)
    } else {
        DEFAULT_SCORE
    }
}
