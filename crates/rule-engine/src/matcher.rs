//! Sample-Against-Rules Matching

use crate::rule::{DurationSpec, Prerequisite, SimpleRule};
use chrono::{DateTime, Utc};
use debounce::{DebounceKey, DebounceStore, DebounceTracker};
use telemetry::{Sample, TagValue};
use tracing::debug;

/// Cross-signal context for prerequisite resolution: points from other
/// source tables observed alongside the sample being evaluated.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    pub related_points: Vec<Sample>,
}

impl MatchContext {
    pub fn new(related_points: Vec<Sample>) -> Self {
        Self { related_points }
    }
}

/// Matches a sample against a rule slice. Candidates are tried in
/// declaration order and the first rule passing the prerequisite,
/// condition, and duration checks wins.
///
/// Rate rules (`threshold_percent`) are not matched here; see
/// [`crate::evaluate_rate`].
pub fn match_sample<'r, S: DebounceStore>(
    sample: &Sample,
    rules: &'r [SimpleRule],
    context: &MatchContext,
    tracker: &mut DebounceTracker<S>,
) -> Option<&'r SimpleRule> {
    for rule in rules {
        if !rule.enabled || rule.is_rate() {
            continue;
        }
        if rule.tag != sample.tag {
            continue;
        }
        if let Some(table) = rule.table {
            if !table.admits(sample.source_kind) {
                continue;
            }
        }

        if let Some(pre) = &rule.prerequisite {
            match resolve_prerequisite(sample, pre, context) {
                Some(actual) => {
                    if !pre.condition.evaluate(&actual, &pre.value) {
                        continue;
                    }
                }
                // Prerequisite tag absent from the batch context: the
                // rule simply does not apply.
                None => continue,
            }
        }

        let key = debounce_key(&sample.unit_id, &rule.tag, &rule.threshold);
        if !rule.condition.evaluate(&sample.value, &rule.threshold) {
            // Condition no longer true: any in-progress sustain timer
            // for this rule resets.
            if rule.duration.map_or(false, |d| !d.is_instant()) {
                tracker.clear(&key);
            }
            continue;
        }

        if !duration_met(tracker, rule.duration.as_ref(), &key, sample.event_time) {
            debug!(
                unit = %sample.unit_id,
                tag = %rule.tag,
                "Condition matched but not yet sustained"
            );
            continue;
        }

        return Some(rule);
    }

    None
}

/// Resolves a prerequisite value: first as a sibling field on the same
/// row, then, when the prerequisite is bound to a table, among the
/// related points from that table.
pub(crate) fn resolve_prerequisite(
    sample: &Sample,
    pre: &Prerequisite,
    context: &MatchContext,
) -> Option<TagValue> {
    if let Some(v) = sample.value_for(&pre.tag) {
        return Some(v.clone());
    }
    let table = pre.table?;
    context
        .related_points
        .iter()
        .find(|p| table.requires(p.source_kind) && p.tag == pre.tag)
        .map(|p| p.value.clone())
}

/// The sustain gate. Absent and instant durations pass without touching
/// the tracker; continuous durations observe the key and compare the
/// elapsed span.
pub(crate) fn duration_met<S: DebounceStore>(
    tracker: &mut DebounceTracker<S>,
    duration: Option<&DurationSpec>,
    key: &DebounceKey,
    at: DateTime<Utc>,
) -> bool {
    match duration {
        None => true,
        Some(d) if d.is_instant() => true,
        Some(d) => tracker.is_sustained(key, d.secs, at),
    }
}

/// Sustain timers are keyed by the rule's threshold, not the observed
/// value, so two rules on the same tag with different thresholds track
/// independently.
pub(crate) fn debounce_key(unit_id: &str, tag: &str, threshold: &TagValue) -> DebounceKey {
    DebounceKey::new(unit_id, tag, threshold.normalized())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{DurationMode, SourceTable};
    use crate::Condition;
    use chrono::TimeZone;
    use debounce::MemoryStore;
    use telemetry::SourceKind;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn tracker() -> DebounceTracker<MemoryStore> {
        DebounceTracker::new(MemoryStore::new())
    }

    fn rule(tag: &str, condition: Condition, threshold: impl Into<TagValue>) -> SimpleRule {
        SimpleRule {
            tag: tag.into(),
            condition,
            threshold: threshold.into(),
            description: format!("{tag} fault"),
            alarm_kind: "CRITICAL".into(),
            complaint_type: None,
            enabled: true,
            table: None,
            prerequisite: None,
            duration: None,
            threshold_percent: None,
            window_hours: None,
        }
    }

    #[test]
    fn test_first_match_wins_in_declaration_order() {
        let rules = vec![
            rule("Tag1", Condition::Gt, 50i64),
            rule("Tag1", Condition::Gt, 10i64),
        ];
        let sample = Sample::new("1001", "Tag1", 55i64, at(0), SourceKind::Digital);
        let hit = match_sample(&sample, &rules, &MatchContext::default(), &mut tracker());
        assert_eq!(hit.unwrap().threshold.normalized(), "50");
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let mut r = rule("Tag1", Condition::Gt, 50i64);
        r.enabled = false;
        let sample = Sample::new("1001", "Tag1", 55i64, at(0), SourceKind::Digital);
        assert!(match_sample(&sample, &[r], &MatchContext::default(), &mut tracker()).is_none());
    }

    #[test]
    fn test_table_binding_filters_by_source() {
        let mut r = rule("Tag8", Condition::Equals, 0i64);
        r.table = Some(SourceTable::Digital);
        let rules = vec![r];

        let analog = Sample::new("1001", "Tag8", 0i64, at(0), SourceKind::Analog);
        assert!(match_sample(&analog, &rules, &MatchContext::default(), &mut tracker()).is_none());

        let unified = Sample::new("1001", "Tag8", 0i64, at(0), SourceKind::Unified);
        assert!(match_sample(&unified, &rules, &MatchContext::default(), &mut tracker()).is_some());
    }

    #[test]
    fn test_prerequisite_from_sibling_row() {
        let mut r = rule("Tag9", Condition::Equals, 1i64);
        r.prerequisite = Some(Prerequisite {
            tag: "Tag6".into(),
            value: TagValue::Number(2.0),
            condition: Condition::Equals,
            table: None,
        });
        let rules = vec![r];

        let with_phase = Sample::new("1001", "Tag9", 1i64, at(0), SourceKind::Unified)
            .with_sibling("Tag6", 2i64);
        assert!(match_sample(&with_phase, &rules, &MatchContext::default(), &mut tracker()).is_some());

        let wrong_phase = Sample::new("1001", "Tag9", 1i64, at(0), SourceKind::Unified)
            .with_sibling("Tag6", 1i64);
        assert!(
            match_sample(&wrong_phase, &rules, &MatchContext::default(), &mut tracker()).is_none()
        );
    }

    #[test]
    fn test_missing_prerequisite_is_no_match_not_error() {
        let mut r = rule("Tag9", Condition::Equals, 1i64);
        r.prerequisite = Some(Prerequisite {
            tag: "Tag6".into(),
            value: TagValue::Number(1.0),
            condition: Condition::Equals,
            table: None,
        });
        let sample = Sample::new("1001", "Tag9", 1i64, at(0), SourceKind::Digital);
        assert!(match_sample(&sample, &[r], &MatchContext::default(), &mut tracker()).is_none());
    }

    #[test]
    fn test_prerequisite_from_related_points() {
        let mut r = rule("Tag11", Condition::Gt, 100i64);
        r.prerequisite = Some(Prerequisite {
            tag: "Tag10".into(),
            value: TagValue::Number(1.0),
            condition: Condition::Equals,
            table: Some(SourceTable::Digital),
        });
        let rules = vec![r];
        let sample = Sample::new("9999", "Tag11", 150i64, at(0), SourceKind::Analog);

        let ctx = MatchContext::new(vec![Sample::new(
            "9999",
            "Tag10",
            1i64,
            at(0),
            SourceKind::Digital,
        )]);
        assert!(match_sample(&sample, &rules, &ctx, &mut tracker()).is_some());

        // A point from the wrong table does not satisfy the binding.
        let ctx = MatchContext::new(vec![Sample::new(
            "9999",
            "Tag10",
            1i64,
            at(0),
            SourceKind::Analog,
        )]);
        assert!(match_sample(&sample, &rules, &ctx, &mut tracker()).is_none());
    }

    #[test]
    fn test_instant_rules_never_touch_the_tracker() {
        let mut r = rule("Tag1", Condition::Gt, 50i64);
        r.duration = Some(DurationSpec {
            secs: 600,
            mode: DurationMode::Instant,
        });
        let sample = Sample::new("1001", "Tag1", 55i64, at(0), SourceKind::Digital);
        let mut trk = tracker();
        assert!(match_sample(&sample, &[r], &MatchContext::default(), &mut trk).is_some());
        assert_eq!(trk.tracked_count(), 0);
    }

    #[test]
    fn test_continuous_duration_gates_until_sustained() {
        let mut r = rule("Tag1", Condition::Gt, 50i64);
        r.duration = Some(DurationSpec::continuous(300));
        let rules = vec![r];
        let mut trk = tracker();

        let early = Sample::new("1001", "Tag1", 55i64, at(100), SourceKind::Digital);
        assert!(match_sample(&early, &rules, &MatchContext::default(), &mut trk).is_none());

        let later = Sample::new("1001", "Tag1", 60i64, at(400), SourceKind::Digital);
        assert!(match_sample(&later, &rules, &MatchContext::default(), &mut trk).is_some());
    }

    #[test]
    fn test_condition_false_resets_sustain_timer() {
        let mut r = rule("Tag1", Condition::Gt, 50i64);
        r.duration = Some(DurationSpec::continuous(300));
        let rules = vec![r];
        let mut trk = tracker();

        let high = Sample::new("1001", "Tag1", 55i64, at(100), SourceKind::Digital);
        assert!(match_sample(&high, &rules, &MatchContext::default(), &mut trk).is_none());
        assert_eq!(trk.tracked_count(), 1);

        // Dips below threshold: timer cleared.
        let low = Sample::new("1001", "Tag1", 40i64, at(200), SourceKind::Digital);
        assert!(match_sample(&low, &rules, &MatchContext::default(), &mut trk).is_none());
        assert_eq!(trk.tracked_count(), 0);

        // High again at t=400: clock restarted, 300s not yet elapsed.
        let high_again = Sample::new("1001", "Tag1", 58i64, at(400), SourceKind::Digital);
        assert!(match_sample(&high_again, &rules, &MatchContext::default(), &mut trk).is_none());
    }

    #[test]
    fn test_rate_rules_ignored_by_plain_matcher() {
        let mut r = rule("Tag4", Condition::Lt, 5i64);
        r.threshold_percent = Some(80.0);
        let sample = Sample::new("1001", "Tag4", 1i64, at(0), SourceKind::Analog);
        assert!(match_sample(&sample, &[r], &MatchContext::default(), &mut tracker()).is_none());
    }
}
