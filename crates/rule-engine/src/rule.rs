//! Rule Configuration Types
//!
//! Rules are deserialized and validated once at configuration load; the
//! evaluation paths work on typed structs with no runtime shape checks.

use crate::Condition;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use telemetry::{SourceKind, TagValue};

/// Which source table a rule (or prerequisite) is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceTable {
    Digital,
    Analog,
}

impl SourceTable {
    /// Whether a sample of `kind` satisfies this table binding.
    /// Unified and computed-state samples are already reconciled across
    /// tables and bypass the check.
    pub fn admits(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Unified | SourceKind::ComputedState => true,
            SourceKind::Digital => *self == SourceTable::Digital,
            SourceKind::Analog => *self == SourceTable::Analog,
        }
    }

    /// Strict match used for related-point lookups, where the point must
    /// actually come from the bound table.
    pub fn requires(&self, kind: SourceKind) -> bool {
        match self {
            SourceTable::Digital => kind == SourceKind::Digital,
            SourceTable::Analog => kind == SourceKind::Analog,
        }
    }
}

impl<'de> Deserialize<'de> for SourceTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Configs may name the source table by its full table name or by
        // kind.
        if raw.eq_ignore_ascii_case("DIGITALDATA") || raw.eq_ignore_ascii_case("DIGITAL") {
            Ok(SourceTable::Digital)
        } else if raw.eq_ignore_ascii_case("ANALOGDATA") || raw.eq_ignore_ascii_case("ANALOG") {
            Ok(SourceTable::Analog)
        } else {
            Err(D::Error::custom(format!("unknown source table: {raw}")))
        }
    }
}

/// How long a condition must hold before a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationMode {
    Instant,
    Continuous,
}

/// A sustain requirement, parsed from strings like `"30m"`, `"24h"`,
/// `"2d"`. A span that fails to parse degrades to zero, which behaves
/// as instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationSpec {
    pub secs: u64,
    pub mode: DurationMode,
}

impl DurationSpec {
    pub fn continuous(secs: u64) -> Self {
        Self {
            secs,
            mode: DurationMode::Continuous,
        }
    }

    pub fn instant() -> Self {
        Self {
            secs: 0,
            mode: DurationMode::Instant,
        }
    }

    /// Instant-mode specs and zero spans require no sustain tracking.
    pub fn is_instant(&self) -> bool {
        self.mode == DurationMode::Instant || self.secs == 0
    }
}

/// Parses `"<n>h" | "<n>m" | "<n>d"` into seconds. Unknown suffixes and
/// unparseable numbers yield zero.
pub(crate) fn parse_span_secs(raw: &str) -> u64 {
    let raw = raw.trim();
    let Some(unit) = raw.chars().last() else {
        return 0;
    };
    let Ok(amount) = raw[..raw.len() - 1].parse::<u64>() else {
        return 0;
    };
    match unit {
        'm' => amount * 60,
        'h' => amount * 60 * 60,
        'd' => amount * 24 * 60 * 60,
        _ => 0,
    }
}

impl<'de> Deserialize<'de> for DurationSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            // Master rules may give the span as a bare string.
            Span(String),
            Full {
                value: String,
                #[serde(default = "default_continuous")]
                mode: DurationMode,
            },
        }

        fn default_continuous() -> DurationMode {
            DurationMode::Continuous
        }

        let spec = match Raw::deserialize(deserializer)? {
            Raw::Span(s) => DurationSpec {
                secs: parse_span_secs(&s),
                mode: DurationMode::Continuous,
            },
            Raw::Full { value, mode } => DurationSpec {
                secs: parse_span_secs(&value),
                mode,
            },
        };
        Ok(spec)
    }
}

/// A secondary condition that must hold before the primary rule may fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prerequisite {
    #[serde(deserialize_with = "de_tag")]
    pub tag: String,
    pub value: TagValue,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub table: Option<SourceTable>,
}

/// An ordinary digital/analog fault rule. Rules carrying
/// `threshold_percent` are evaluated by the percentage rate evaluator
/// instead of the plain matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRule {
    #[serde(deserialize_with = "de_tag")]
    pub tag: String,
    pub condition: Condition,
    pub threshold: TagValue,
    pub description: String,
    #[serde(default = "default_alarm_kind")]
    pub alarm_kind: String,
    #[serde(default)]
    pub complaint_type: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub table: Option<SourceTable>,
    #[serde(default)]
    pub prerequisite: Option<Prerequisite>,
    #[serde(default)]
    pub duration: Option<DurationSpec>,
    #[serde(default)]
    pub threshold_percent: Option<f64>,
    #[serde(default)]
    pub window_hours: Option<u32>,
}

impl SimpleRule {
    pub fn is_rate(&self) -> bool {
        self.threshold_percent.is_some()
    }
}

/// A high-priority rule that can suppress ordinary rules for a unit.
/// Priority 1 blocks everything; other priorities are collected and
/// suppress only the digital/analog rule sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterRule {
    #[serde(deserialize_with = "de_tag")]
    pub tag: String,
    pub threshold: TagValue,
    #[serde(default)]
    pub condition: Condition,
    pub description: String,
    #[serde(default = "default_critical")]
    pub alarm_kind: String,
    #[serde(default)]
    pub complaint_type: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub table: Option<SourceTable>,
    #[serde(default)]
    pub duration: Option<DurationSpec>,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

/// A named group of ordinary rules with a master enable switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<SimpleRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            description: None,
            rules: Vec::new(),
        }
    }
}

/// The full rule surface for a run: digital rules, analog rules, and the
/// master/priority rules. Loaded once per run, read-only thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub di_rules: RuleSet,
    #[serde(default)]
    pub ai_rules: RuleSet,
    #[serde(default)]
    pub master_rules: Vec<MasterRule>,
}

impl RuleConfig {
    /// Ordinary rule slices applicable to a sample of `kind`, digital
    /// set first. Unified and computed-state samples carry both kinds of
    /// data and see both sets.
    pub fn sets_for(&self, kind: SourceKind) -> Vec<&[SimpleRule]> {
        let mut sets = Vec::new();
        let digital = matches!(
            kind,
            SourceKind::Digital | SourceKind::Unified | SourceKind::ComputedState
        );
        let analog = matches!(kind, SourceKind::Analog | SourceKind::Unified);
        if digital && self.di_rules.enabled {
            sets.push(self.di_rules.rules.as_slice());
        }
        if analog && self.ai_rules.enabled {
            sets.push(self.ai_rules.rules.as_slice());
        }
        sets
    }

    /// Whether any enabled ordinary rule is a rate rule; used to decide
    /// whether a unit's history window needs fetching at all.
    pub fn has_rate_rules(&self) -> bool {
        let in_set = |set: &RuleSet| set.enabled && set.rules.iter().any(|r| r.enabled && r.is_rate());
        in_set(&self.di_rules) || in_set(&self.ai_rules)
    }

    /// Largest configured rate window, for a single history fetch per
    /// unit. Defaults to 48 hours.
    pub fn max_window_hours(&self) -> u32 {
        self.di_rules
            .rules
            .iter()
            .chain(self.ai_rules.rules.iter())
            .filter(|r| r.is_rate())
            .map(|r| r.window_hours.unwrap_or(48))
            .max()
            .unwrap_or(48)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_alarm_kind() -> String {
    "GENERAL".to_string()
}

fn default_critical() -> String {
    "CRITICAL".to_string()
}

fn default_priority() -> u8 {
    1
}

// Tags may appear as bare numbers in hand-written configs.
fn de_tag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_span_secs() {
        assert_eq!(parse_span_secs("5m"), 300);
        assert_eq!(parse_span_secs("24h"), 86_400);
        assert_eq!(parse_span_secs("2d"), 172_800);
        assert_eq!(parse_span_secs("oops"), 0);
        assert_eq!(parse_span_secs(""), 0);
    }

    #[test]
    fn test_duration_from_object_and_string() {
        let d: DurationSpec =
            serde_json::from_str(r#"{"value": "5m", "mode": "continuous"}"#).unwrap();
        assert_eq!(d.secs, 300);
        assert!(!d.is_instant());

        let d: DurationSpec = serde_json::from_str(r#"{"value": "1h", "mode": "instant"}"#).unwrap();
        assert!(d.is_instant());

        let d: DurationSpec = serde_json::from_str(r#""30m""#).unwrap();
        assert_eq!(d.secs, 1800);
        assert_eq!(d.mode, DurationMode::Continuous);
    }

    #[test]
    fn test_zero_span_behaves_as_instant() {
        let d: DurationSpec = serde_json::from_str(r#"{"value": "bogus"}"#).unwrap();
        assert!(d.is_instant());
    }

    #[test]
    fn test_source_table_admits() {
        assert!(SourceTable::Digital.admits(SourceKind::Digital));
        assert!(!SourceTable::Digital.admits(SourceKind::Analog));
        assert!(SourceTable::Digital.admits(SourceKind::Unified));
        assert!(SourceTable::Analog.admits(SourceKind::ComputedState));
    }

    #[test]
    fn test_rule_deserialization_with_defaults() {
        let rule: SimpleRule = serde_json::from_str(
            r#"{
                "tag": "Tag1",
                "condition": "gt",
                "threshold": 50,
                "description": "High Temp"
            }"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.alarm_kind, "GENERAL");
        assert!(rule.duration.is_none());
        assert!(!rule.is_rate());
    }

    #[test]
    fn test_numeric_tag_normalizes_to_string() {
        let rule: SimpleRule = serde_json::from_str(
            r#"{"tag": 7, "condition": "equals", "threshold": 1, "description": "Trip"}"#,
        )
        .unwrap();
        assert_eq!(rule.tag, "7");
    }

    #[test]
    fn test_rule_config_set_selection() {
        let cfg = RuleConfig {
            di_rules: RuleSet {
                enabled: true,
                description: None,
                rules: vec![],
            },
            ai_rules: RuleSet {
                enabled: true,
                description: None,
                rules: vec![],
            },
            master_rules: vec![],
        };
        assert_eq!(cfg.sets_for(SourceKind::Digital).len(), 1);
        assert_eq!(cfg.sets_for(SourceKind::Analog).len(), 1);
        assert_eq!(cfg.sets_for(SourceKind::Unified).len(), 2);
        // Computed-state samples are digital-shaped.
        assert_eq!(cfg.sets_for(SourceKind::ComputedState).len(), 1);
    }

    #[test]
    fn test_max_window_hours() {
        let mut cfg = RuleConfig::default();
        assert_eq!(cfg.max_window_hours(), 48);
        cfg.ai_rules.rules.push(SimpleRule {
            tag: "Tag4".into(),
            condition: Condition::Lt,
            threshold: TagValue::Number(5.0),
            description: "Dim lamp".into(),
            alarm_kind: "MINOR".into(),
            complaint_type: None,
            enabled: true,
            table: None,
            prerequisite: None,
            duration: None,
            threshold_percent: Some(60.0),
            window_hours: Some(72),
        });
        assert!(cfg.has_rate_rules());
        assert_eq!(cfg.max_window_hours(), 72);
    }
}
