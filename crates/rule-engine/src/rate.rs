//! Percentage Rate Evaluation
//!
//! A rate rule fires when the share of historical samples matching its
//! condition, over a sliding window per (unit, tag), reaches a configured
//! percentage. Used for faults that flicker too much for plain threshold
//! rules, e.g. a lamp that reads dark on most of its recent samples.

use crate::matcher::{debounce_key, duration_met, resolve_prerequisite, MatchContext};
use crate::rule::SimpleRule;
use chrono::{DateTime, Duration, Utc};
use debounce::{DebounceStore, DebounceTracker};
use telemetry::{FaultCandidate, RateStats, Sample};
use tracing::debug;

const DEFAULT_THRESHOLD_PERCENT: f64 = 80.0;
const DEFAULT_WINDOW_HOURS: u32 = 48;

/// Evaluates rate rules for one sample against the unit's history.
/// Returns the first rule (declaration order) whose window percentage
/// meets its threshold and whose sustain gate passes, as a candidate
/// carrying the window statistics.
pub fn evaluate_rate<S: DebounceStore>(
    sample: &Sample,
    history: &[Sample],
    rules: &[SimpleRule],
    context: &MatchContext,
    tracker: &mut DebounceTracker<S>,
    now: DateTime<Utc>,
) -> Option<FaultCandidate> {
    for rule in rules {
        if !rule.enabled || !rule.is_rate() || rule.tag != sample.tag {
            continue;
        }

        if let Some(pre) = &rule.prerequisite {
            match resolve_prerequisite(sample, pre, context) {
                Some(actual) => {
                    if !pre.condition.evaluate(&actual, &pre.value) {
                        continue;
                    }
                }
                None => continue,
            }
        }

        let window_hours = rule.window_hours.unwrap_or(DEFAULT_WINDOW_HOURS);
        let cutoff = now - Duration::hours(window_hours as i64);

        let relevant: Vec<&Sample> = history
            .iter()
            .filter(|h| h.event_time >= cutoff && h.value_for(&rule.tag).is_some())
            .collect();

        // No in-window observations of this tag: percentage undefined.
        if relevant.is_empty() {
            continue;
        }

        let match_count = relevant
            .iter()
            .filter(|h| {
                h.value_for(&rule.tag)
                    .map_or(false, |v| rule.condition.evaluate(v, &rule.threshold))
            })
            .count();
        let sample_count = relevant.len();
        let percent = match_count as f64 * 100.0 / sample_count as f64;
        let threshold_percent = rule.threshold_percent.unwrap_or(DEFAULT_THRESHOLD_PERCENT);

        if percent < threshold_percent {
            debug!(
                unit = %sample.unit_id,
                tag = %rule.tag,
                "{}/{} ({:.2}%) below {}%",
                match_count, sample_count, percent, threshold_percent
            );
            continue;
        }

        // The sustain gate keys off the instantaneous condition, not how
        // long the percentage has been over threshold.
        let key = debounce_key(&sample.unit_id, &rule.tag, &rule.threshold);
        if !duration_met(tracker, rule.duration.as_ref(), &key, sample.event_time) {
            debug!(
                unit = %sample.unit_id,
                tag = %rule.tag,
                "{:.2}% met but duration not yet reached",
                percent
            );
            continue;
        }

        debug!(
            unit = %sample.unit_id,
            tag = %rule.tag,
            "{}/{} ({:.2}%) >= {}%",
            match_count, sample_count, percent, threshold_percent
        );

        return Some(FaultCandidate {
            unit_id: sample.unit_id.clone(),
            tag: sample.tag.clone(),
            value: sample.value.clone(),
            event_time: sample.event_time,
            description: rule.description.clone(),
            alarm_kind: rule.alarm_kind.clone(),
            complaint_type: rule.complaint_type.clone(),
            stats: Some(RateStats {
                match_count,
                sample_count,
                percent,
            }),
        });
    }

    None
}
