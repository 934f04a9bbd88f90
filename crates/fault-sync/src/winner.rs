//! Per-Unit Winner Selection

use chrono::{DateTime, Utc};
use debounce::{DebounceStore, DebounceTracker};
use rule_engine::{
    arbitrate, evaluate_rate, match_sample, MasterMatch, MatchContext, RuleConfig, SimpleRule,
};
use serde::{Deserialize, Serialize};
use telemetry::{FaultCandidate, Sample};

/// How many winners a unit's batch may produce.
///
/// `Single` collapses everything to the one latest qualifying fault.
/// `PerTag` lets unrelated fault types (a circuit trip and a lamp
/// failure, say) coexist as separate incidents, one per distinct tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerPolicy {
    Single,
    PerTag,
}

impl Default for WinnerPolicy {
    fn default() -> Self {
        WinnerPolicy::Single
    }
}

/// Groups the ordered sample stream into per-unit batches.
///
/// `push` returns the previous unit's completed batch whenever the unit
/// changes; `finish` drains the final one. Relies on the source's
/// (unit, time) ordering contract.
#[derive(Debug, Default)]
pub struct UnitBatcher {
    current: Option<String>,
    buffer: Vec<Sample>,
}

impl UnitBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) -> Option<(String, Vec<Sample>)> {
        let flushed = match &self.current {
            Some(unit) if *unit != sample.unit_id => {
                let batch = std::mem::take(&mut self.buffer);
                Some((unit.clone(), batch))
            }
            _ => None,
        };
        self.current = Some(sample.unit_id.clone());
        self.buffer.push(sample);
        flushed
    }

    pub fn finish(&mut self) -> Option<(String, Vec<Sample>)> {
        let unit = self.current.take()?;
        if self.buffer.is_empty() {
            return None;
        }
        Some((unit, std::mem::take(&mut self.buffer)))
    }
}

/// Evaluates one unit's batch and picks its winning fault candidates.
///
/// Tiered precedence: a blocking master match is the sole winner; else
/// the latest collected (tier-2) master match wins; else every buffered
/// sample is evaluated against the ordinary rule sets and the rate
/// evaluator, and the policy picks among the qualifying hits. Latest
/// event time breaks ties throughout.
pub fn select_winners<S: DebounceStore>(
    unit_id: &str,
    samples: &[Sample],
    rules: &RuleConfig,
    history: &[Sample],
    policy: WinnerPolicy,
    tracker: &mut DebounceTracker<S>,
    now: DateTime<Utc>,
) -> Vec<FaultCandidate> {
    let arbitration = arbitrate(unit_id, samples, &rules.master_rules, tracker);

    if let Some(blocking) = arbitration.blocking {
        return vec![master_candidate(&blocking)];
    }

    if let Some(latest) = arbitration
        .collected
        .iter()
        .max_by_key(|m| m.sample.event_time)
    {
        return vec![master_candidate(latest)];
    }

    let context = MatchContext::new(samples.to_vec());
    let mut hits: Vec<FaultCandidate> = Vec::new();

    for sample in samples {
        let sets = rules.sets_for(sample.source_kind);

        if let Some(rule) = sets
            .iter()
            .find_map(|set| match_sample(sample, set, &context, tracker))
        {
            hits.push(simple_candidate(sample, rule));
        }

        if let Some(candidate) = sets
            .iter()
            .find_map(|set| evaluate_rate(sample, history, set, &context, tracker, now))
        {
            hits.push(candidate);
        }
    }

    match policy {
        WinnerPolicy::Single => latest_hit(hits).into_iter().collect(),
        WinnerPolicy::PerTag => latest_per_tag(hits),
    }
}

fn master_candidate(m: &MasterMatch<'_>) -> FaultCandidate {
    FaultCandidate {
        unit_id: m.sample.unit_id.clone(),
        tag: m.rule.tag.clone(),
        value: m.sample.value.clone(),
        event_time: m.sample.event_time,
        description: m.rule.description.clone(),
        alarm_kind: m.rule.alarm_kind.clone(),
        complaint_type: m.rule.complaint_type.clone(),
        stats: None,
    }
}

fn simple_candidate(sample: &Sample, rule: &SimpleRule) -> FaultCandidate {
    FaultCandidate {
        unit_id: sample.unit_id.clone(),
        tag: sample.tag.clone(),
        value: sample.value.clone(),
        event_time: sample.event_time,
        description: rule.description.clone(),
        alarm_kind: rule.alarm_kind.clone(),
        complaint_type: rule.complaint_type.clone(),
        stats: None,
    }
}

// Later hits win ties, so equal timestamps resolve to the hit
// encountered last in stream order.
fn latest_hit(hits: Vec<FaultCandidate>) -> Option<FaultCandidate> {
    let mut best: Option<FaultCandidate> = None;
    for hit in hits {
        match &best {
            Some(b) if hit.event_time < b.event_time => {}
            _ => best = Some(hit),
        }
    }
    best
}

fn latest_per_tag(hits: Vec<FaultCandidate>) -> Vec<FaultCandidate> {
    let mut winners: Vec<FaultCandidate> = Vec::new();
    for hit in hits {
        match winners.iter_mut().find(|w| w.tag == hit.tag) {
            Some(existing) => {
                if hit.event_time >= existing.event_time {
                    *existing = hit;
                }
            }
            None => winners.push(hit),
        }
    }
    winners
}
