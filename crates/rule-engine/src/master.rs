//! Master Rule Arbitration
//!
//! Master rules model unit-wide failure states (power loss, dead
//! communications) that make per-signal fault rules meaningless for the
//! affected unit. Priority 1 blocks everything for the unit; other
//! priorities are collected and suppress only the ordinary rule sets.

use crate::matcher::{debounce_key, duration_met};
use crate::rule::MasterRule;
use debounce::{DebounceStore, DebounceTracker};
use telemetry::Sample;
use tracing::warn;

/// One master rule satisfied by one sample.
#[derive(Debug, Clone)]
pub struct MasterMatch<'r> {
    pub rule: &'r MasterRule,
    pub sample: Sample,
}

/// Outcome of arbitrating a unit's batch against the master rules.
#[derive(Debug, Default)]
pub struct MasterArbitration<'r> {
    /// A priority-1 match; suppresses everything else for the unit.
    pub blocking: Option<MasterMatch<'r>>,
    /// Lower-priority matches; suppress ordinary rules but remain
    /// candidate-eligible themselves.
    pub collected: Vec<MasterMatch<'r>>,
}

impl<'r> MasterArbitration<'r> {
    pub fn suppresses_ordinary(&self) -> bool {
        self.blocking.is_some() || !self.collected.is_empty()
    }
}

/// Evaluates the master rules against a unit's buffered samples.
///
/// Per enabled rule, the first sample with matching tag and value (loose
/// string equality) and a compatible source table is taken; the sustain
/// gate then decides whether the rule is active. The first qualifying
/// priority-1 rule returns immediately and discards anything collected
/// so far. A rule with no matching sample has its sustain timer cleared:
/// the condition is no longer observed.
pub fn arbitrate<'r, S: DebounceStore>(
    unit_id: &str,
    samples: &[Sample],
    rules: &'r [MasterRule],
    tracker: &mut DebounceTracker<S>,
) -> MasterArbitration<'r> {
    let mut collected = Vec::new();

    for rule in rules {
        if !rule.enabled {
            continue;
        }

        let matching = samples.iter().find(|s| {
            if let Some(table) = rule.table {
                if !table.admits(s.source_kind) {
                    return false;
                }
            }
            s.tag == rule.tag && s.value.loosely_eq(&rule.threshold)
        });

        let key = debounce_key(unit_id, &rule.tag, &rule.threshold);
        let Some(sample) = matching else {
            tracker.clear(&key);
            continue;
        };

        if !duration_met(tracker, rule.duration.as_ref(), &key, sample.event_time) {
            continue;
        }

        if rule.priority == 1 {
            warn!(
                unit = unit_id,
                rule = %rule.description,
                "Master override: suppressing all ordinary rules for unit"
            );
            return MasterArbitration {
                blocking: Some(MasterMatch {
                    rule,
                    sample: sample.clone(),
                }),
                collected: Vec::new(),
            };
        }

        collected.push(MasterMatch {
            rule,
            sample: sample.clone(),
        });
    }

    MasterArbitration {
        blocking: None,
        collected,
    }
}
