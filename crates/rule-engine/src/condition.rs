//! Comparison Conditions

use serde::{Deserialize, Serialize};
use std::fmt;
use telemetry::TagValue;

/// The six comparison operators the rule language supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Gt,
    Lt,
    Gte,
    Lte,
    Equals,
    Neq,
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Equals
    }
}

impl Condition {
    /// Compares `actual` against `threshold`.
    ///
    /// Both operands are coerced to numbers first. If either fails to
    /// coerce, only `Equals`/`Neq` fall back to string comparison; the
    /// ordering operators return false on non-numeric operands rather
    /// than erroring.
    pub fn evaluate(&self, actual: &TagValue, threshold: &TagValue) -> bool {
        match (actual.as_f64(), threshold.as_f64()) {
            (Some(a), Some(t)) => match self {
                Condition::Gt => a > t,
                Condition::Lt => a < t,
                Condition::Gte => a >= t,
                Condition::Lte => a <= t,
                Condition::Equals => a == t,
                Condition::Neq => a != t,
            },
            _ => match self {
                Condition::Equals => actual.normalized() == threshold.normalized(),
                Condition::Neq => actual.normalized() != threshold.normalized(),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Condition::Gt => "gt",
            Condition::Lt => "lt",
            Condition::Gte => "gte",
            Condition::Lte => "lte",
            Condition::Equals => "equals",
            Condition::Neq => "neq",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn n(v: f64) -> TagValue {
        TagValue::Number(v)
    }

    fn t(v: &str) -> TagValue {
        TagValue::from(v)
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(Condition::Gt.evaluate(&n(55.0), &n(50.0)));
        assert!(!Condition::Gt.evaluate(&n(50.0), &n(50.0)));
        assert!(Condition::Gte.evaluate(&n(50.0), &n(50.0)));
        assert!(Condition::Lt.evaluate(&n(5.0), &n(10.0)));
        assert!(Condition::Lte.evaluate(&n(10.0), &n(10.0)));
        assert!(Condition::Equals.evaluate(&n(0.0), &n(0.0)));
        assert!(Condition::Neq.evaluate(&n(1.0), &n(0.0)));
    }

    #[test]
    fn test_numeric_strings_coerce() {
        assert!(Condition::Gt.evaluate(&t("55"), &n(50.0)));
        assert!(Condition::Equals.evaluate(&t("0"), &n(0.0)));
    }

    #[test]
    fn test_string_fallback_only_for_equality() {
        assert!(Condition::Equals.evaluate(&t("TRIP"), &t("TRIP")));
        assert!(Condition::Neq.evaluate(&t("TRIP"), &t("OK")));
        // Ordering degrades to false on non-numeric operands.
        assert!(!Condition::Gt.evaluate(&t("TRIP"), &n(1.0)));
        assert!(!Condition::Lt.evaluate(&n(1.0), &t("TRIP")));
        assert!(!Condition::Gte.evaluate(&t("A"), &t("B")));
    }

    #[test]
    fn test_serde_names() {
        let c: Condition = serde_json::from_str("\"gte\"").unwrap();
        assert_eq!(c, Condition::Gte);
        assert_eq!(serde_json::to_string(&Condition::Neq).unwrap(), "\"neq\"");
    }

    proptest! {
        #[test]
        fn prop_numeric_ops_match_f64_semantics(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            prop_assert_eq!(Condition::Gt.evaluate(&n(a), &n(b)), a > b);
            prop_assert_eq!(Condition::Lt.evaluate(&n(a), &n(b)), a < b);
            prop_assert_eq!(Condition::Gte.evaluate(&n(a), &n(b)), a >= b);
            prop_assert_eq!(Condition::Lte.evaluate(&n(a), &n(b)), a <= b);
        }

        #[test]
        fn prop_numeric_text_equals_number(v in -1000i64..1000) {
            let text = TagValue::from(v.to_string());
            prop_assert!(Condition::Equals.evaluate(&text, &n(v as f64)));
        }
    }
}
