//! Composite score calculation.

use serde::{Deserialize, Serialize};

use super::{DimensionScore, GuardRules, Recommendation, WeightingPolicy};
use crate::errors::ScoringError;

/// Composite score, recommendation and the dimensions behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    /// Weighted mean rounded to one decimal.
    pub composite_score: f64,
    /// Tier for the composite, after guards.
    pub recommendation: Recommendation,
    /// Inputs in the order supplied.
    pub dimensions: Vec<DimensionScore>,
    /// True if a guard changed the recommendation.
    pub override_applied: bool,
    /// Why the last guard fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<String>,
    /// Conditions attached by guards.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
}

/// Turns dimension scores into a [`CompositeResult`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreAggregator {
    weighting: WeightingPolicy,
    guards: GuardRules,
}

impl ScoreAggregator {
    /// Equal weights, no guards.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the weighting policy.
    #[must_use]
    pub fn with_weighting(mut self, weighting: WeightingPolicy) -> Self {
        self.weighting = weighting;
        self
    }

    /// Sets the guard rules.
    #[must_use]
    pub fn with_guards(mut self, guards: GuardRules) -> Self {
        self.guards = guards;
        self
    }

    /// Computes the composite. The result does not depend on the order of
    /// `dimensions`.
    ///
    /// # Errors
    ///
    /// Fails if a weighting table lacks a supplied dimension or the
    /// supplied weights sum to zero.
    pub fn calculate_program_score(
        &self,
        dimensions: &[DimensionScore],
    ) -> Result<CompositeResult, ScoringError> {
        let composite = round_one_decimal(self.weighted_mean(dimensions)?);
        let tier = Recommendation::from_composite(composite);
        let guarded = self.guards.apply(dimensions, composite, tier);

        Ok(CompositeResult {
            composite_score: composite,
            recommendation: guarded.recommendation.unwrap_or(tier),
            dimensions: dimensions.to_vec(),
            override_applied: guarded.applied(),
            override_reason: guarded.reason,
            conditions: guarded.conditions,
        })
    }

    fn weighted_mean(&self, dimensions: &[DimensionScore]) -> Result<f64, ScoringError> {
        if dimensions.is_empty() {
            return Ok(0.0);
        }

        let mut weighted = dimensions
            .iter()
            .map(|d| {
                self.weighting
                    .weight_of(&d.dimension)
                    .map(|weight| (d.dimension.as_str(), d.score, weight))
            })
            .collect::<Result<Vec<_>, ScoringError>>()?;
        // Fixed summation order keeps the float result permutation-stable.
        weighted.sort_by(|a, b| a.0.cmp(b.0).then(a.1.total_cmp(&b.1)));

        let total_weight: f64 = weighted.iter().map(|(_, _, w)| w).sum();
        if total_weight <= 0.0 {
            return Err(ScoringError::ZeroTotalWeight);
        }
        let sum: f64 = weighted.iter().map(|(_, s, w)| s * w).sum();
        Ok(sum / total_weight)
    }
}

/// Equal-weighted composite without guards.
#[must_use]
pub fn calculate_program_score(dimensions: &[DimensionScore]) -> CompositeResult {
    let composite = round_one_decimal(equal_mean(dimensions));
    CompositeResult {
        composite_score: composite,
        recommendation: Recommendation::from_composite(composite),
        dimensions: dimensions.to_vec(),
        override_applied: false,
        override_reason: None,
        conditions: Vec::new(),
    }
}

fn equal_mean(dimensions: &[DimensionScore]) -> f64 {
    if dimensions.is_empty() {
        return 0.0;
    }
    let mut scores: Vec<f64> = dimensions.iter().map(|d| d.score).collect();
    scores.sort_by(f64::total_cmp);
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::DEFAULT_SCORE;
    use pretty_assertions::assert_eq;

    fn dims(scores: &[(&str, f64)]) -> Vec<DimensionScore> {
        scores
            .iter()
            .map(|(d, s)| DimensionScore::new(*d, *s, format!("{d} rationale")))
            .collect()
    }

    #[test]
    fn test_equal_weighted_mean() {
        let result = calculate_program_score(&dims(&[
            ("a", 8.0),
            ("b", 8.0),
            ("c", 8.0),
            ("d", 7.0),
            ("e", 7.0),
            ("f", 7.4),
            ("g", DEFAULT_SCORE),
        ]));
        assert!((result.composite_score - 7.2).abs() < f64::EPSILON);
        assert_eq!(result.recommendation, Recommendation::ConditionalGo);
        assert_eq!(result.dimensions.len(), 7);
        assert!(!result.override_applied);
    }

    #[test]
    fn test_order_independent() {
        let forward = dims(&[("a", 9.1), ("b", 3.3), ("c", 6.7), ("d", 0.1), ("e", 7.77)]);
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut rotated = forward.clone();
        rotated.rotate_left(2);

        let aggregator = ScoreAggregator::new();
        let expected = aggregator.calculate_program_score(&forward).unwrap();
        for permutation in [&reversed, &rotated] {
            let result = aggregator.calculate_program_score(permutation).unwrap();
            assert_eq!(result.composite_score.to_bits(), expected.composite_score.to_bits());
            assert_eq!(result.recommendation, expected.recommendation);
        }
        assert_eq!(
            calculate_program_score(&reversed).composite_score.to_bits(),
            expected.composite_score.to_bits()
        );
    }

    #[test]
    fn test_empty_is_no_go() {
        let result = calculate_program_score(&[]);
        assert!(result.composite_score.abs() < f64::EPSILON);
        assert_eq!(result.recommendation, Recommendation::NoGo);
    }

    #[test]
    fn test_weighted_table() {
        let weighting = WeightingPolicy::table([("Labor", 0.75), ("Regulatory", 0.25)]).unwrap();
        let aggregator = ScoreAggregator::new().with_weighting(weighting);

        let result = aggregator
            .calculate_program_score(&dims(&[("Labor", 9.0), ("Regulatory", 5.0)]))
            .unwrap();
        assert!((result.composite_score - 8.0).abs() < f64::EPSILON);
        assert_eq!(result.recommendation, Recommendation::StrongGo);
    }

    #[test]
    fn test_weighted_table_rejects_unknown_dimension() {
        let weighting = WeightingPolicy::table([("Labor", 1.0)]).unwrap();
        let err = ScoreAggregator::new()
            .with_weighting(weighting)
            .calculate_program_score(&dims(&[("Labor", 9.0), ("Branding", 5.0)]))
            .unwrap_err();
        assert!(matches!(err, ScoringError::UnknownDimension { ref dimension, .. } if dimension == "Branding"));
    }

    #[test]
    fn test_zero_weights_rejected() {
        let weighting = WeightingPolicy::table([("a", 0.0)]).unwrap();
        let err = ScoreAggregator::new()
            .with_weighting(weighting)
            .calculate_program_score(&dims(&[("a", 9.0)]))
            .unwrap_err();
        assert_eq!(err, ScoringError::ZeroTotalWeight);
    }

    #[test]
    fn test_guards_reported_on_result() {
        let aggregator = ScoreAggregator::new().with_guards(GuardRules::none().with_weak_score_cap(3.0));
        let result = aggregator
            .calculate_program_score(&dims(&[("a", 10.0), ("b", 10.0), ("c", 10.0), ("d", 3.0)]))
            .unwrap();

        assert!((result.composite_score - 8.3).abs() < f64::EPSILON);
        assert_eq!(result.recommendation, Recommendation::ConditionalGo);
        assert!(result.override_applied);
        assert_eq!(result.conditions.len(), 1);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["recommendation"], "conditional_go");
        assert_eq!(json["override_applied"], true);
    }

    #[test]
    fn test_rounding_to_one_decimal() {
        let result = calculate_program_score(&dims(&[("a", 7.0), ("b", 7.0), ("c", 8.0)]));
        assert!((result.composite_score - 7.3).abs() < f64::EPSILON);
    }
}
