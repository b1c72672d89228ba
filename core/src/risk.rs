//! Risk classification: churn probability to an ordinal level.

use crate::{config::RiskThresholds, step::StepTable};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "Low",
            Self::Medium   => "Medium",
            Self::High     => "High",
            Self::Critical => "Critical",
        }
    }

    /// Case-insensitive parse of a level name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a probability to a level. Total over f64; NaN classifies as Low.
pub fn classify(probability: f64, thresholds: &RiskThresholds) -> RiskLevel {
    let steps = [
        (thresholds.critical, RiskLevel::Critical),
        (thresholds.high,     RiskLevel::High),
        (thresholds.medium,   RiskLevel::Medium),
    ];
    StepTable::at_least(&steps, RiskLevel::Low).lookup(probability)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder() {
        let t = RiskThresholds::default();
        assert_eq!(classify(0.0, &t), RiskLevel::Low);
        assert_eq!(classify(0.39, &t), RiskLevel::Low);
        assert_eq!(classify(0.4, &t), RiskLevel::Medium);
        assert_eq!(classify(0.7, &t), RiskLevel::High);
        assert_eq!(classify(0.89, &t), RiskLevel::High);
        assert_eq!(classify(0.9, &t), RiskLevel::Critical);
        assert_eq!(classify(1.0, &t), RiskLevel::Critical);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn parse_round_trips_display() {
        for level in RiskLevel::ALL {
            assert_eq!(RiskLevel::parse(&level.to_string()), Some(level));
        }
        assert_eq!(RiskLevel::parse(" critical "), Some(RiskLevel::Critical));
        assert_eq!(RiskLevel::parse("severe"), None);
    }
}
