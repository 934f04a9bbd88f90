//! Fault Candidates

use crate::TagValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Window statistics attached by the percentage rate evaluator.
///
/// `percent` is exact; rounding to two decimals happens only when the
/// value is rendered into a complaint description or a log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateStats {
    pub match_count: usize,
    pub sample_count: usize,
    pub percent: f64,
}

impl RateStats {
    /// Two-decimal display form, e.g. `"66.67"`.
    pub fn percent_display(&self) -> String {
        format!("{:.2}", self.percent)
    }
}

/// A qualifying fault, ready for deduplication and persistence.
///
/// Carries the matched rule's describing fields flattened in, so the
/// complaint mapper and the incident store need no reference back into
/// the rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultCandidate {
    pub unit_id: String,
    pub tag: String,
    pub value: TagValue,
    pub event_time: DateTime<Utc>,
    /// Human-readable fault description from the matched rule.
    pub description: String,
    /// Alarm classification from the matched rule (e.g. `CRITICAL`).
    pub alarm_kind: String,
    /// Complaint type override from the matched rule, if any.
    pub complaint_type: Option<String>,
    pub stats: Option<RateStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_display_rounding() {
        let s = RateStats {
            match_count: 2,
            sample_count: 3,
            percent: 2.0 * 100.0 / 3.0,
        };
        assert_eq!(s.percent_display(), "66.67");

        let s = RateStats {
            match_count: 8,
            sample_count: 32,
            percent: 8.0 * 100.0 / 32.0,
        };
        assert_eq!(s.percent, 25.0);
        assert_eq!(s.percent_display(), "25.00");
    }
}
