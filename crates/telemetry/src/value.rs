//! Tag Value Representation

use serde::{Deserialize, Serialize};
use std::fmt;

/// A telemetry value as read from the source store.
///
/// Source tables mix numeric columns with free-form text, and rule
/// thresholds in configuration may be written either way, so comparisons
/// are numeric-first with a string fallback (see `as_f64` and
/// `normalized`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Number(f64),
    Text(String),
}

impl TagValue {
    /// Numeric view of the value. Text values parse if they hold a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Number(n) => Some(*n),
            TagValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Canonical string form, used for debounce keys and loose equality.
    ///
    /// Whole numbers render without a fractional part so `0`, `0.0` and
    /// `"0"` all normalize to the same key.
    pub fn normalized(&self) -> String {
        self.to_string()
    }

    /// Loose equality: the comparison source tables and configuration
    /// agree on (string-normalized, so `1`, `1.0` and `"1"` are equal).
    pub fn loosely_eq(&self, other: &TagValue) -> bool {
        self.normalized() == other.normalized()
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            TagValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for TagValue {
    fn from(n: f64) -> Self {
        TagValue::Number(n)
    }
}

impl From<i64> for TagValue {
    fn from(n: i64) -> Self {
        TagValue::Number(n as f64)
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        self.loosely_eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(TagValue::from("42").as_f64(), Some(42.0));
        assert_eq!(TagValue::from(" 3.5 ").as_f64(), Some(3.5));
        assert_eq!(TagValue::from("TRIP").as_f64(), None);
        assert_eq!(TagValue::from(7i64).as_f64(), Some(7.0));
    }

    #[test]
    fn test_normalized_whole_numbers() {
        assert_eq!(TagValue::Number(0.0).normalized(), "0");
        assert_eq!(TagValue::Number(1.0).normalized(), "1");
        assert_eq!(TagValue::Number(2.5).normalized(), "2.5");
        assert_eq!(TagValue::from("ON").normalized(), "ON");
    }

    #[test]
    fn test_loose_equality() {
        assert!(TagValue::Number(1.0).loosely_eq(&TagValue::from("1")));
        assert!(!TagValue::Number(1.0).loosely_eq(&TagValue::from("2")));
        assert!(TagValue::from("OK").loosely_eq(&TagValue::from("OK")));
    }

    #[test]
    fn test_untagged_deserialization() {
        let v: TagValue = serde_json::from_str("0").unwrap();
        assert_eq!(v.normalized(), "0");
        let v: TagValue = serde_json::from_str("\"TRIP\"").unwrap();
        assert_eq!(v.normalized(), "TRIP");
    }
}
