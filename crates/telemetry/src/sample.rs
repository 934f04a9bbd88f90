//! Telemetry Samples

use crate::TagValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a sample originated.
///
/// `Unified` rows come from the joined digital/analog query and carry
/// sibling tags from both tables. `ComputedState` samples are synthesized
/// by the staleness and power-failure detectors rather than read directly
/// from a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Digital,
    Analog,
    Unified,
    ComputedState,
}

/// One observed value of one tag at one unit at one time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// RTU identifier, stringified.
    pub unit_id: String,
    /// Tag name, e.g. `"Tag16"`.
    pub tag: String,
    pub value: TagValue,
    pub event_time: DateTime<Utc>,
    pub source_kind: SourceKind,
    /// Other tag values from the same joined row, keyed by tag name.
    /// Used for prerequisite lookups against tags that are not emitted
    /// as samples of their own.
    #[serde(default)]
    pub siblings: HashMap<String, TagValue>,
}

impl Sample {
    pub fn new(
        unit_id: impl Into<String>,
        tag: impl Into<String>,
        value: impl Into<TagValue>,
        event_time: DateTime<Utc>,
        source_kind: SourceKind,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            tag: tag.into(),
            value: value.into(),
            event_time,
            source_kind,
            siblings: HashMap::new(),
        }
    }

    pub fn with_sibling(mut self, tag: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.siblings.insert(tag.into(), value.into());
        self
    }

    /// Value of `tag` on this row: the sample's own value when the tag
    /// matches, otherwise a sibling from the joined row.
    pub fn value_for(&self, tag: &str) -> Option<&TagValue> {
        if self.tag == tag {
            Some(&self.value)
        } else {
            self.siblings.get(tag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_value_for_own_tag() {
        let s = Sample::new("1001", "Tag7", 1i64, at(0), SourceKind::Digital);
        assert_eq!(s.value_for("Tag7").unwrap().normalized(), "1");
    }

    #[test]
    fn test_value_for_sibling() {
        let s = Sample::new("1001", "Tag7", 1i64, at(0), SourceKind::Unified)
            .with_sibling("Tag6", 2i64);
        assert_eq!(s.value_for("Tag6").unwrap().normalized(), "2");
        assert!(s.value_for("Tag99").is_none());
    }
}
