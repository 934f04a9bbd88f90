//! The Sync Run
//!
//! One run: lease, checkpoint, computed-state pass, ordered stream pass
//! through the winner selector, dedup, persistence, checkpoint advance.
//! A run always terminates cleanly: per-candidate failures are counted
//! and skipped, only a dead source aborts the run.

use crate::dedup::is_duplicate;
use crate::lease::RunLease;
use crate::mapper::{map_candidate, ComplaintMapping};
use crate::ports::{CheckpointStore, IncidentStore, SourceReader};
use crate::winner::{select_winners, UnitBatcher, WinnerPolicy};
use chrono::{DateTime, Duration, Utc};
use debounce::{DebounceStore, DebounceTracker};
use rule_engine::RuleConfig;
use std::collections::HashSet;
use telemetry::{FaultCandidate, Sample};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Per-run knobs, owned by configuration.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Checkpoint key; distinct deployments against the same target
    /// store use distinct keys.
    pub run_key: String,
    /// Fallback window when no checkpoint exists.
    pub lookback_hours: u32,
    /// Incident statuses that no longer suppress a new complaint.
    pub closed_statuses: Vec<String>,
    pub winner_policy: WinnerPolicy,
    /// Log candidates instead of persisting them.
    pub dry_run: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            run_key: "fault-sync".to_string(),
            lookback_hours: 24,
            closed_statuses: vec![
                "CLOSED".to_string(),
                "RESOLVED".to_string(),
                "REJECTED".to_string(),
            ],
            winner_policy: WinnerPolicy::default(),
            dry_run: false,
        }
    }
}

/// Outcome counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,
    #[error("source stream failed: {0}")]
    Source(String),
}

/// The sync engine, wired to its collaborators once at startup.
pub struct SyncJob<R, I, C, D>
where
    R: SourceReader,
    I: IncidentStore,
    C: CheckpointStore,
    D: DebounceStore,
{
    source: R,
    incidents: I,
    checkpoints: C,
    tracker: DebounceTracker<D>,
    rules: RuleConfig,
    mapping: ComplaintMapping,
    settings: JobSettings,
    lease: RunLease,
}

impl<R, I, C, D> SyncJob<R, I, C, D>
where
    R: SourceReader,
    I: IncidentStore,
    C: CheckpointStore,
    D: DebounceStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: R,
        incidents: I,
        checkpoints: C,
        tracker: DebounceTracker<D>,
        rules: RuleConfig,
        mapping: ComplaintMapping,
        settings: JobSettings,
        lease: RunLease,
    ) -> Self {
        Self {
            source,
            incidents,
            checkpoints,
            tracker,
            rules,
            mapping,
            settings,
            lease,
        }
    }

    /// Executes one run. `now` is the run's reference time for windows
    /// and clamping.
    pub async fn run(&mut self, now: DateTime<Utc>) -> Result<RunStats, SyncError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let Some(_guard) = self.lease.try_acquire(run_id.clone()) else {
            return Err(SyncError::AlreadyRunning);
        };

        let since = self.resolve_since(now).await;
        info!(run_id = %run_id, since = %since, "Starting sync run");

        let mut stats = RunStats::default();
        // One persistence attempt per (unit, tag) per run, no matter how
        // many paths nominate the key.
        let mut batch_keys: HashSet<(String, String)> = HashSet::new();

        self.computed_state_pass(&mut stats, &mut batch_keys).await;

        let latest_event = self
            .stream_pass(since, now, &mut stats, &mut batch_keys)
            .await?;

        if let Some(latest) = latest_event {
            if let Err(e) = self
                .checkpoints
                .set_last_processed(&self.settings.run_key, latest)
                .await
            {
                warn!(error = %e, "Failed to advance checkpoint");
            }
        }

        info!(
            processed = stats.processed,
            skipped = stats.skipped,
            errors = stats.errors,
            "Sync run complete"
        );
        Ok(stats)
    }

    /// Checkpoint, or the lookback fallback. A future-dated checkpoint
    /// (bad data) resets to the lookback floor.
    async fn resolve_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let fallback = now - Duration::hours(self.settings.lookback_hours as i64);
        let since = match self.checkpoints.last_processed(&self.settings.run_key).await {
            Ok(Some(t)) => t,
            Ok(None) => fallback,
            Err(e) => {
                warn!(error = %e, "Checkpoint read failed, using lookback window");
                fallback
            }
        };
        if since > now {
            warn!(checkpoint = %since, "Future-dated checkpoint, resetting to lookback");
            return fallback;
        }
        since
    }

    /// Feeds the staleness and power-failure detectors' output through
    /// the matching master rules. Detector failures are logged and the
    /// run continues; the stream pass still covers directly-reported
    /// faults.
    async fn computed_state_pass(
        &self,
        stats: &mut RunStats,
        batch_keys: &mut HashSet<(String, String)>,
    ) {
        let comm = self.source.communication_faults().await;
        self.route_computed("communication", comm, stats, batch_keys)
            .await;
        let power = self.source.power_failures().await;
        self.route_computed("power", power, stats, batch_keys).await;
    }

    async fn route_computed<E: std::fmt::Display>(
        &self,
        detector: &str,
        fetched: Result<Vec<Sample>, E>,
        stats: &mut RunStats,
        batch_keys: &mut HashSet<(String, String)>,
    ) {
        let samples = match fetched {
            Ok(samples) => samples,
            Err(e) => {
                error!(detector, error = %e, "Computed-state detection failed");
                return;
            }
        };
        info!(detector, count = samples.len(), "Computed-state faults detected");

        for sample in samples {
            let Some(rule) = self
                .rules
                .master_rules
                .iter()
                .find(|r| r.enabled && r.tag == sample.tag)
            else {
                debug!(detector, tag = %sample.tag, "No enabled master rule for computed fault");
                continue;
            };
            let candidate = FaultCandidate {
                unit_id: sample.unit_id.clone(),
                tag: rule.tag.clone(),
                value: sample.value.clone(),
                event_time: sample.event_time,
                description: rule.description.clone(),
                alarm_kind: rule.alarm_kind.clone(),
                complaint_type: rule.complaint_type.clone(),
                stats: None,
            };
            persist_candidate(
                &self.incidents,
                &self.mapping,
                &self.settings,
                batch_keys,
                stats,
                candidate,
            )
            .await;
        }
    }

    /// Pulls the ordered stream, flushing each unit's batch through the
    /// winner selector. Returns the latest event time seen.
    async fn stream_pass(
        &mut self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        stats: &mut RunStats,
        batch_keys: &mut HashSet<(String, String)>,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        let mut rx = self
            .source
            .stream_since(since)
            .await
            .map_err(|e| SyncError::Source(e.to_string()))?;

        let mut batcher = UnitBatcher::new();
        let mut latest: Option<DateTime<Utc>> = None;

        while let Some(sample) = rx.recv().await {
            if latest.map_or(true, |t| sample.event_time > t) {
                latest = Some(sample.event_time);
            }
            if let Some((unit, batch)) = batcher.push(sample) {
                self.flush_unit(&unit, &batch, now, stats, batch_keys).await;
            }
        }
        if let Some((unit, batch)) = batcher.finish() {
            self.flush_unit(&unit, &batch, now, stats, batch_keys).await;
        }

        Ok(latest)
    }

    async fn flush_unit(
        &mut self,
        unit_id: &str,
        batch: &[Sample],
        now: DateTime<Utc>,
        stats: &mut RunStats,
        batch_keys: &mut HashSet<(String, String)>,
    ) {
        // The history window is only needed when rate rules exist.
        let history = if self.rules.has_rate_rules() {
            match self
                .source
                .fetch_history(unit_id, self.rules.max_window_hours())
                .await
            {
                Ok(history) => history,
                Err(e) => {
                    warn!(unit = unit_id, error = %e, "History fetch failed, rate rules idle this run");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let winners = select_winners(
            unit_id,
            batch,
            &self.rules,
            &history,
            self.settings.winner_policy,
            &mut self.tracker,
            now,
        );

        for winner in winners {
            persist_candidate(
                &self.incidents,
                &self.mapping,
                &self.settings,
                batch_keys,
                stats,
                winner,
            )
            .await;
        }
    }
}

async fn persist_candidate<I: IncidentStore>(
    incidents: &I,
    mapping: &ComplaintMapping,
    settings: &JobSettings,
    batch_keys: &mut HashSet<(String, String)>,
    stats: &mut RunStats,
    candidate: FaultCandidate,
) {
    let key = (candidate.unit_id.clone(), candidate.tag.clone());
    if !batch_keys.insert(key) {
        return;
    }

    if is_duplicate(incidents, &candidate, &settings.closed_statuses).await {
        stats.skipped += 1;
        return;
    }

    if settings.dry_run {
        info!(
            unit = %candidate.unit_id,
            tag = %candidate.tag,
            description = %candidate.description,
            "[dry-run] would register complaint"
        );
        stats.processed += 1;
        return;
    }

    let draft = map_candidate(&candidate, mapping);
    match incidents.persist(&candidate, &draft).await {
        Ok(incident_id) => {
            info!(
                unit = %candidate.unit_id,
                tag = %candidate.tag,
                incident_id,
                description = %candidate.description,
                "Registered complaint"
            );
            metrics::counter!("sync_faults_processed_total").increment(1);
            stats.processed += 1;
        }
        Err(e) => {
            // The checkpoint still advances; the fault stays in the next
            // run's lookback window and dedup keeps the retry idempotent.
            error!(
                unit = %candidate.unit_id,
                tag = %candidate.tag,
                error = %e,
                "Complaint persistence failed"
            );
            metrics::counter!("sync_persist_errors_total").increment(1);
            stats.errors += 1;
        }
    }
}
