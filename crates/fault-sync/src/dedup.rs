//! Incident Deduplication

use crate::ports::IncidentStore;
use telemetry::FaultCandidate;
use tracing::{info, warn};

/// Decides whether an equivalent, still-active incident already exists
/// for the candidate's (unit, tag).
///
/// No prior fault record, or a record with no linked incident, or an
/// incident in the closed set: not a duplicate. Anything else is, and
/// the suppression is logged with the existing incident's id and status.
/// A lookup failure fails open: over-alerting beats silently dropping a
/// real fault.
pub async fn is_duplicate<I: IncidentStore>(
    store: &I,
    candidate: &FaultCandidate,
    closed_statuses: &[String],
) -> bool {
    let existing = match store
        .latest_incident(&candidate.unit_id, &candidate.tag)
        .await
    {
        Ok(existing) => existing,
        Err(e) => {
            warn!(
                unit = %candidate.unit_id,
                tag = %candidate.tag,
                error = %e,
                "Duplicate lookup failed, allowing candidate through"
            );
            return false;
        }
    };

    let Some(incident) = existing else {
        return false;
    };

    let closed = closed_statuses
        .iter()
        .any(|s| s.eq_ignore_ascii_case(&incident.status));
    if closed {
        return false;
    }

    info!(
        unit = %candidate.unit_id,
        tag = %candidate.tag,
        incident_id = incident.id,
        status = %incident.status,
        value = %candidate.value,
        "Skipping: active incident already exists"
    );
    metrics::counter!("sync_faults_suppressed_total").increment(1);
    true
}
