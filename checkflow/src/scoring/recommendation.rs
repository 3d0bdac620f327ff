//! Categorical recommendation tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum composite for [`Recommendation::StrongGo`].
pub const STRONG_GO_THRESHOLD: f64 = 8.0;

/// Minimum composite for [`Recommendation::ConditionalGo`].
pub const CONDITIONAL_GO_THRESHOLD: f64 = 6.5;

/// Minimum composite for [`Recommendation::CautiousProceed`].
pub const CAUTIOUS_PROCEED_THRESHOLD: f64 = 5.0;

/// Minimum composite for [`Recommendation::Defer`].
pub const DEFER_THRESHOLD: f64 = 3.5;

/// Recommendation derived from a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Below every threshold.
    NoGo,
    /// Revisit later.
    Defer,
    /// Proceed with care.
    CautiousProceed,
    /// Proceed once conditions are met.
    ConditionalGo,
    /// Proceed.
    StrongGo,
}

impl Recommendation {
    /// Maps a composite score onto the threshold table.
    #[must_use]
    pub fn from_composite(composite: f64) -> Self {
        if composite >= STRONG_GO_THRESHOLD {
            Self::StrongGo
        } else if composite >= CONDITIONAL_GO_THRESHOLD {
            Self::ConditionalGo
        } else if composite >= CAUTIOUS_PROCEED_THRESHOLD {
            Self::CautiousProceed
        } else if composite >= DEFER_THRESHOLD {
            Self::Defer
        } else {
            Self::NoGo
        }
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrongGo => "strong_go",
            Self::ConditionalGo => "conditional_go",
            Self::CautiousProceed => "cautious_proceed",
            Self::Defer => "defer",
            Self::NoGo => "no_go",
        }
    }

    /// Title-case name for reports.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::StrongGo => "Strong Go",
            Self::ConditionalGo => "Conditional Go",
            Self::CautiousProceed => "Cautious Proceed",
            Self::Defer => "Defer",
            Self::NoGo => "No Go",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_table() {
        assert_eq!(Recommendation::from_composite(10.0), Recommendation::StrongGo);
        assert_eq!(Recommendation::from_composite(8.0), Recommendation::StrongGo);
        assert_eq!(Recommendation::from_composite(7.2), Recommendation::ConditionalGo);
        assert_eq!(Recommendation::from_composite(6.5), Recommendation::ConditionalGo);
        assert_eq!(Recommendation::from_composite(6.4), Recommendation::CautiousProceed);
        assert_eq!(Recommendation::from_composite(5.0), Recommendation::CautiousProceed);
        assert_eq!(Recommendation::from_composite(3.5), Recommendation::Defer);
        assert_eq!(Recommendation::from_composite(3.4), Recommendation::NoGo);
        assert_eq!(Recommendation::from_composite(0.0), Recommendation::NoGo);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&Recommendation::ConditionalGo).unwrap(),
            "\"conditional_go\""
        );
        assert_eq!(Recommendation::CautiousProceed.to_string(), "cautious_proceed");
        assert_eq!(Recommendation::NoGo.label(), "No Go");
    }

    #[test]
    fn test_ordering() {
        assert!(Recommendation::StrongGo > Recommendation::ConditionalGo);
        assert!(Recommendation::Defer > Recommendation::NoGo);
    }
}
