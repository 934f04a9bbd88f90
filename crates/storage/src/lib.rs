//! Storage Layer
//!
//! SQLite implementations of the sync engine's collaborator ports: the
//! ordered telemetry source (with the computed-state detectors), the
//! incident/complaint store, and the run checkpoint store.

mod checkpoint;
mod incidents;
mod source;

pub use checkpoint::SqliteCheckpoints;
pub use incidents::SqliteIncidents;
pub use source::{SourceSettings, SqliteSource};

use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
