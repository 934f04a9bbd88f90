//! SQLite Checkpoint Store

use crate::StorageError;
use chrono::{DateTime, Utc};
use fault_sync::CheckpointStore;
use sqlx::{Row, SqlitePool};

/// Durable last-processed-time watermark, one row per run key.
pub struct SqliteCheckpoints {
    pool: SqlitePool,
}

impl SqliteCheckpoints {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(pool: &SqlitePool) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

impl CheckpointStore for SqliteCheckpoints {
    type Error = StorageError;

    async fn last_processed(&self, run_key: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("SELECT value FROM sync_state WHERE key = ?")
            .bind(run_key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get::<DateTime<Utc>, _>("value")?)),
            None => Ok(None),
        }
    }

    async fn set_last_processed(
        &self,
        run_key: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO sync_state (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(run_key)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
