//! Composite scoring.
//!
//! Pure and deterministic: the same dimension scores always produce the
//! same composite and recommendation, whatever their order.

mod aggregator;
mod dimension;
mod guards;
mod recommendation;
mod weighting;

pub use aggregator::{calculate_program_score, CompositeResult, ScoreAggregator};
pub use dimension::{DimensionScore, DEFAULT_RATIONALE, DEFAULT_SCORE, MAX_SCORE, MIN_SCORE};
pub use guards::{CriticalDimension, GuardOutcome, GuardRules};
pub use recommendation::{
    Recommendation, CAUTIOUS_PROCEED_THRESHOLD, CONDITIONAL_GO_THRESHOLD, DEFER_THRESHOLD,
    STRONG_GO_THRESHOLD,
};
pub use weighting::WeightingPolicy;
