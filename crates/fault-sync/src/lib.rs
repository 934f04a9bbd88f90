//! Fault Sync Orchestration
//!
//! Consumes the ordered telemetry stream, arbitrates faults per unit,
//! deduplicates against open incidents, and persists the winners as
//! complaints. One run at a time, resumable from a checkpoint.

mod dedup;
mod job;
mod lease;
mod mapper;
mod ports;
mod winner;

pub use dedup::is_duplicate;
pub use job::{JobSettings, RunStats, SyncError, SyncJob};
pub use lease::{LeaseGuard, RunLease};
pub use mapper::{map_candidate, ComplaintMapping};
pub use ports::{CheckpointStore, IncidentDraft, IncidentRef, IncidentStore, SourceReader};
pub use winner::{select_winners, UnitBatcher, WinnerPolicy};
