//! SQLite Telemetry Source
//!
//! Reads the tag-oriented `telemetry` table (one row per unit, tag,
//! time) and reconstructs joined samples: rows sharing a unit and event
//! time become sibling fields of one another, mirroring the joined
//! digital/analog row shape the rule engine expects.

use crate::StorageError;
use chrono::{DateTime, Duration, Utc};
use fault_sync::SourceReader;
use futures::TryStreamExt;
use sqlx::{Row, SqlitePool};
use telemetry::{Sample, SourceKind, TagValue};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Knobs for the source queries.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Communication-status tag (low means not communicating).
    pub comm_tag: String,
    /// Power-status tag (low means power failure).
    pub power_tag: String,
    /// Hours without fresh digital data before a unit counts as stale.
    pub comm_stale_hours: i64,
    /// Hours without any analog data before a stale unit counts as dead.
    pub comm_dead_hours: i64,
    /// How far back the power-failure detector looks, in minutes.
    pub power_lookback_minutes: i64,
    /// Bound on the sample channel; the producer awaits capacity while
    /// the consumer evaluates.
    pub channel_capacity: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            comm_tag: "Tag8".to_string(),
            power_tag: "Tag16".to_string(),
            comm_stale_hours: 1,
            comm_dead_hours: 24,
            power_lookback_minutes: 60,
            channel_capacity: 64,
        }
    }
}

pub struct SqliteSource {
    pool: SqlitePool,
    settings: SourceSettings,
}

struct RawRow {
    unit_id: String,
    tag: String,
    value: TagValue,
    event_time: DateTime<Utc>,
    source_kind: SourceKind,
}

impl SqliteSource {
    pub fn new(pool: SqlitePool, settings: SourceSettings) -> Self {
        Self { pool, settings }
    }

    /// Creates the telemetry table and its ordering index.
    pub async fn migrate(pool: &SqlitePool) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS telemetry (
                rtu_number TEXT NOT NULL,
                tag TEXT NOT NULL,
                value TEXT NOT NULL,
                event_time TEXT NOT NULL,
                source TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_telemetry_order
             ON telemetry (rtu_number, event_time, tag)",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Inserts one reading; used by tests and the demo seeder.
    pub async fn insert_reading(
        &self,
        unit_id: &str,
        tag: &str,
        value: &TagValue,
        event_time: DateTime<Utc>,
        source_kind: SourceKind,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO telemetry (rtu_number, tag, value, event_time, source)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(unit_id)
        .bind(tag)
        .bind(value.normalized())
        .bind(event_time)
        .bind(kind_label(source_kind))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_value(raw: &str) -> TagValue {
    match raw.trim().parse::<f64>() {
        Ok(n) => TagValue::Number(n),
        Err(_) => TagValue::Text(raw.to_string()),
    }
}

fn parse_kind(raw: &str) -> SourceKind {
    match raw {
        "ANALOG" => SourceKind::Analog,
        "DIGITAL" => SourceKind::Digital,
        other => {
            warn!(source = other, "Unknown source kind, treating as digital");
            SourceKind::Digital
        }
    }
}

fn kind_label(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Digital => "DIGITAL",
        SourceKind::Analog => "ANALOG",
        SourceKind::Unified => "UNIFIED",
        SourceKind::ComputedState => "COMPUTED_STATE",
    }
}

fn row_to_raw(row: &sqlx::sqlite::SqliteRow) -> Result<RawRow, sqlx::Error> {
    Ok(RawRow {
        unit_id: row.try_get::<String, _>("rtu_number")?,
        tag: row.try_get::<String, _>("tag")?,
        value: parse_value(&row.try_get::<String, _>("value")?),
        event_time: row.try_get::<DateTime<Utc>, _>("event_time")?,
        source_kind: parse_kind(&row.try_get::<String, _>("source")?),
    })
}

/// Turns one (unit, time) row group into unified samples: each tag
/// becomes a sample carrying every other tag in the group as a sibling.
fn emit_group(group: &[RawRow]) -> Vec<Sample> {
    group
        .iter()
        .map(|row| {
            let mut sample = Sample::new(
                row.unit_id.clone(),
                row.tag.clone(),
                row.value.clone(),
                row.event_time,
                SourceKind::Unified,
            );
            for sibling in group {
                if sibling.tag != row.tag {
                    sample
                        .siblings
                        .insert(sibling.tag.clone(), sibling.value.clone());
                }
            }
            sample
        })
        .collect()
}

/// One sample per row group, for history windows: the group's first tag
/// carries the rest as siblings, so per-tag lookups see each row once.
fn emit_history_row(group: &[RawRow]) -> Option<Sample> {
    let first = group.first()?;
    let mut sample = Sample::new(
        first.unit_id.clone(),
        first.tag.clone(),
        first.value.clone(),
        first.event_time,
        SourceKind::Unified,
    );
    for sibling in &group[1..] {
        sample
            .siblings
            .insert(sibling.tag.clone(), sibling.value.clone());
    }
    Some(sample)
}

impl SourceReader for SqliteSource {
    type Error = StorageError;

    async fn stream_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<mpsc::Receiver<Sample>, StorageError> {
        // Surface connectivity problems to the caller; a dead source is
        // a run-level failure, not something to swallow in the task.
        self.pool.acquire().await?;

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let mut rows = sqlx::query(
                "SELECT rtu_number, tag, value, event_time, source
                 FROM telemetry
                 WHERE event_time > ?
                 ORDER BY rtu_number ASC, event_time ASC, tag ASC",
            )
            .bind(since)
            .fetch(&pool);

            let mut group: Vec<RawRow> = Vec::new();
            loop {
                let row = match rows.try_next().await {
                    Ok(Some(row)) => row,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Telemetry stream failed mid-run");
                        return;
                    }
                };
                let raw = match row_to_raw(&row) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed telemetry row");
                        continue;
                    }
                };

                let boundary = group
                    .first()
                    .map(|g| g.unit_id != raw.unit_id || g.event_time != raw.event_time)
                    .unwrap_or(false);
                if boundary {
                    for sample in emit_group(&group) {
                        if tx.send(sample).await.is_err() {
                            return;
                        }
                    }
                    group.clear();
                }
                group.push(raw);
            }
            for sample in emit_group(&group) {
                if tx.send(sample).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn fetch_history(
        &self,
        unit_id: &str,
        window_hours: u32,
    ) -> Result<Vec<Sample>, StorageError> {
        let cutoff = Utc::now() - Duration::hours(window_hours as i64);
        let rows = sqlx::query(
            "SELECT rtu_number, tag, value, event_time, source
             FROM telemetry
             WHERE rtu_number = ? AND event_time >= ?
             ORDER BY event_time ASC, tag ASC",
        )
        .bind(unit_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut history = Vec::new();
        let mut group: Vec<RawRow> = Vec::new();
        for row in &rows {
            let raw = row_to_raw(row)?;
            let boundary = group
                .first()
                .map(|g| g.event_time != raw.event_time)
                .unwrap_or(false);
            if boundary {
                history.extend(emit_history_row(&group));
                group.clear();
            }
            group.push(raw);
        }
        history.extend(emit_history_row(&group));
        Ok(history)
    }

    async fn communication_faults(&self) -> Result<Vec<Sample>, StorageError> {
        let now = Utc::now();
        let stale_cutoff = now - Duration::hours(self.settings.comm_stale_hours);
        let dead_cutoff = now - Duration::hours(self.settings.comm_dead_hours);

        let rows = sqlx::query(
            "SELECT rtu_number, MAX(event_time) AS last_seen
             FROM telemetry
             WHERE tag = ? AND value = '0' AND source = 'DIGITAL'
             GROUP BY rtu_number
             HAVING MAX(event_time) <= ?
                AND rtu_number NOT IN (
                    SELECT DISTINCT rtu_number FROM telemetry
                    WHERE source = 'ANALOG' AND event_time >= ?
                )",
        )
        .bind(&self.settings.comm_tag)
        .bind(stale_cutoff)
        .bind(dead_cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Sample::new(
                    row.try_get::<String, _>("rtu_number")?,
                    self.settings.comm_tag.clone(),
                    0i64,
                    row.try_get::<DateTime<Utc>, _>("last_seen")?,
                    SourceKind::ComputedState,
                ))
            })
            .collect()
    }

    async fn power_failures(&self) -> Result<Vec<Sample>, StorageError> {
        let cutoff = Utc::now() - Duration::minutes(self.settings.power_lookback_minutes);
        let rows = sqlx::query(
            "SELECT rtu_number, event_time
             FROM telemetry
             WHERE tag = ? AND value = '0' AND source = 'DIGITAL' AND event_time >= ?",
        )
        .bind(&self.settings.power_tag)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Sample::new(
                    row.try_get::<String, _>("rtu_number")?,
                    self.settings.power_tag.clone(),
                    0i64,
                    row.try_get::<DateTime<Utc>, _>("event_time")?,
                    SourceKind::ComputedState,
                ))
            })
            .collect()
    }
}
