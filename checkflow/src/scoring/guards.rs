//! Opt-in recommendation overrides.
//!
//! Guards run after the threshold table. Later guards win when several
//! apply, and the last applied guard supplies the reported reason.

use serde::{Deserialize, Serialize};

use super::{DimensionScore, Recommendation, DEFER_THRESHOLD};

/// A dimension that forces `defer`/`no_go` when it scores below `floor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalDimension {
    /// Dimension name.
    pub dimension: String,
    /// Scores strictly below this trigger the guard.
    pub floor: f64,
    /// Appended to the override reason.
    pub reason: String,
}

/// Override rules applied to a recommendation. Empty by default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GuardRules {
    /// Any dimension at or below this caps `strong_go` at `conditional_go`.
    pub weak_score_cap: Option<f64>,
    /// Dimensions that veto the run when weak.
    pub critical: Vec<CriticalDimension>,
}

/// Outcome of applying [`GuardRules`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GuardOutcome {
    /// Recommendation after overrides.
    pub recommendation: Option<Recommendation>,
    /// Reason of the last applied guard.
    pub reason: Option<String>,
    /// Conditions attached by the guards.
    pub conditions: Vec<String>,
}

impl GuardOutcome {
    /// Returns true if any guard changed the recommendation.
    #[must_use]
    pub fn applied(&self) -> bool {
        self.reason.is_some()
    }
}

impl GuardRules {
    /// No guards.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the weak-score cap.
    #[must_use]
    pub fn with_weak_score_cap(mut self, cap: f64) -> Self {
        self.weak_score_cap = Some(cap);
        self
    }

    /// Adds a critical dimension.
    #[must_use]
    pub fn with_critical(
        mut self,
        dimension: impl Into<String>,
        floor: f64,
        reason: impl Into<String>,
    ) -> Self {
        self.critical.push(CriticalDimension {
            dimension: dimension.into(),
            floor,
            reason: reason.into(),
        });
        self
    }

    /// Returns true if no guard is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weak_score_cap.is_none() && self.critical.is_empty()
    }

    /// Applies every guard to `recommendation`.
    #[must_use]
    pub fn apply(
        &self,
        dimensions: &[DimensionScore],
        composite: f64,
        recommendation: Recommendation,
    ) -> GuardOutcome {
        let mut outcome = GuardOutcome::default();
        let mut current = recommendation;

        if let Some(cap) = self.weak_score_cap {
            let weak = dimensions.iter().find(|d| d.score <= cap);
            if let (Some(weak), Recommendation::StrongGo) = (weak, current) {
                current = Recommendation::ConditionalGo;
                outcome.reason = Some(format!(
                    "{} scored {}/10, capping recommendation at {}",
                    weak.dimension,
                    weak.score,
                    current.label()
                ));
                outcome
                    .conditions
                    .push(format!("Address weakness in {} before proceeding", weak.dimension));
            }
        }

        for critical in &self.critical {
            let Some(found) = dimensions.iter().find(|d| d.dimension == critical.dimension) else {
                continue;
            };
            if found.score < critical.floor {
                current = if composite >= DEFER_THRESHOLD {
                    Recommendation::Defer
                } else {
                    Recommendation::NoGo
                };
                outcome.reason = Some(format!(
                    "{} scored {}/10: {}",
                    found.dimension, found.score, critical.reason
                ));
            }
        }

        if outcome.applied() {
            outcome.recommendation = Some(current);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(scores: &[(&str, f64)]) -> Vec<DimensionScore> {
        scores
            .iter()
            .map(|(d, s)| DimensionScore::new(*d, *s, "r"))
            .collect()
    }

    #[test]
    fn test_no_guards_change_nothing() {
        let outcome = GuardRules::none().apply(&dims(&[("a", 1.0)]), 9.0, Recommendation::StrongGo);
        assert!(!outcome.applied());
        assert_eq!(outcome.recommendation, None);
    }

    #[test]
    fn test_weak_score_caps_strong_go() {
        let rules = GuardRules::none().with_weak_score_cap(3.0);
        let outcome = rules.apply(
            &dims(&[("Demand", 10.0), ("Regulatory", 3.0)]),
            8.2,
            Recommendation::StrongGo,
        );

        assert_eq!(outcome.recommendation, Some(Recommendation::ConditionalGo));
        assert_eq!(
            outcome.reason.as_deref(),
            Some("Regulatory scored 3/10, capping recommendation at Conditional Go")
        );
        assert_eq!(outcome.conditions, vec!["Address weakness in Regulatory before proceeding"]);
    }

    #[test]
    fn test_weak_score_leaves_lower_tiers() {
        let rules = GuardRules::none().with_weak_score_cap(3.0);
        let outcome = rules.apply(&dims(&[("a", 2.0)]), 6.9, Recommendation::ConditionalGo);
        assert!(!outcome.applied());
    }

    #[test]
    fn test_critical_dimension_forces_defer_or_no_go() {
        let rules =
            GuardRules::none().with_critical("Financial", 4.0, "no viable financial model");

        let outcome = rules.apply(
            &dims(&[("Financial", 3.5), ("Demand", 9.0)]),
            6.3,
            Recommendation::CautiousProceed,
        );
        assert_eq!(outcome.recommendation, Some(Recommendation::Defer));
        assert_eq!(
            outcome.reason.as_deref(),
            Some("Financial scored 3.5/10: no viable financial model")
        );

        let outcome = rules.apply(&dims(&[("Financial", 1.0)]), 2.0, Recommendation::NoGo);
        assert_eq!(outcome.recommendation, Some(Recommendation::NoGo));
    }

    #[test]
    fn test_last_guard_wins() {
        let rules = GuardRules::none()
            .with_weak_score_cap(3.0)
            .with_critical("Labor", 4.0, "there must be jobs for completers");
        let outcome = rules.apply(
            &dims(&[("Labor", 2.0), ("Demand", 10.0)]),
            8.0,
            Recommendation::StrongGo,
        );

        assert_eq!(outcome.recommendation, Some(Recommendation::Defer));
        assert!(outcome.reason.unwrap().starts_with("Labor scored 2/10"));
        assert_eq!(outcome.conditions.len(), 1);
    }
}
