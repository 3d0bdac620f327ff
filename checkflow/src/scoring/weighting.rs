//! Dimension weighting policies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ScoringError;

/// How dimensions are weighted in the composite.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "weights", rename_all = "snake_case")]
pub enum WeightingPolicy {
    /// Every dimension counts the same.
    #[default]
    Equal,
    /// Explicit weight per dimension. Weights are normalized over the
    /// dimensions actually supplied.
    Table(BTreeMap<String, f64>),
}

impl WeightingPolicy {
    /// Builds a validated weighting table.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::InvalidWeight`] for a negative or
    /// non-finite weight.
    pub fn table<I, K>(weights: I) -> Result<Self, ScoringError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut table = BTreeMap::new();
        for (dimension, weight) in weights {
            let dimension = dimension.into();
            if !weight.is_finite() || weight < 0.0 {
                return Err(ScoringError::InvalidWeight { dimension, weight });
            }
            table.insert(dimension, weight);
        }
        Ok(Self::Table(table))
    }

    /// Weight of `dimension`.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::UnknownDimension`] if a table has no entry
    /// for it.
    pub fn weight_of(&self, dimension: &str) -> Result<f64, ScoringError> {
        match self {
            Self::Equal => Ok(1.0),
            Self::Table(table) => {
                table
                    .get(dimension)
                    .copied()
                    .ok_or_else(|| ScoringError::UnknownDimension {
                        dimension: dimension.to_string(),
                        known: table.keys().cloned().collect(),
                    })
            }
        }
    }
}
