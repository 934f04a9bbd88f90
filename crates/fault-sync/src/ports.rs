//! Collaborator Ports
//!
//! Call contracts the sync engine consumes. Implementations live in the
//! `storage` crate; tests use in-memory fakes.

use chrono::{DateTime, Utc};
use std::fmt::Display;
use telemetry::{FaultCandidate, Sample};
use tokio::sync::mpsc;

/// The telemetry source.
///
/// `stream_since` must yield samples ordered by (unit, event time)
/// ascending; the winner selector's per-unit buffering depends on it.
/// Delivery through a bounded channel gives the producer backpressure:
/// it awaits capacity while the consumer evaluates.
pub trait SourceReader {
    type Error: Display + Send + Sync + 'static;

    fn stream_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<mpsc::Receiver<Sample>, Self::Error>> + Send;

    /// Prior samples for one unit within the window, for the rate
    /// evaluator.
    fn fetch_history(
        &self,
        unit_id: &str,
        window_hours: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Sample>, Self::Error>> + Send;

    /// Units whose reporting has gone stale, as computed-state samples.
    fn communication_faults(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Sample>, Self::Error>> + Send;

    /// Units reporting power loss within the short lookback, as
    /// computed-state samples.
    fn power_failures(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Sample>, Self::Error>> + Send;
}

/// The incident linked to a unit/tag's most recent fault record.
#[derive(Debug, Clone)]
pub struct IncidentRef {
    pub id: i64,
    pub status: String,
}

/// Everything the incident store needs beyond the candidate itself:
/// rendered text, classification, and the raw fault payload.
#[derive(Debug, Clone)]
pub struct IncidentDraft {
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub complaint_type: String,
    /// JSON payload linking the complaint back to the raw fault.
    pub tags: String,
}

/// The incident/complaint store.
pub trait IncidentStore {
    type Error: Display + Send + Sync + 'static;

    /// Incident linked to the most recent fault record for (unit, tag),
    /// if any.
    fn latest_incident(
        &self,
        unit_id: &str,
        tag: &str,
    ) -> impl std::future::Future<Output = Result<Option<IncidentRef>, Self::Error>> + Send;

    /// Persists the fault record and its complaint atomically, returning
    /// the new incident id.
    fn persist(
        &self,
        candidate: &FaultCandidate,
        draft: &IncidentDraft,
    ) -> impl std::future::Future<Output = Result<i64, Self::Error>> + Send;
}

/// Durable per-run-key watermark of the last processed event time.
pub trait CheckpointStore {
    type Error: Display + Send + Sync + 'static;

    fn last_processed(
        &self,
        run_key: &str,
    ) -> impl std::future::Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send;

    fn set_last_processed(
        &self,
        run_key: &str,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}
