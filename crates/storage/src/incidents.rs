//! SQLite Incident Store
//!
//! Persists each winning fault as a fault-log row plus a complaint,
//! atomically, with a sequential human-facing complaint number and an
//! SLA deadline resolved from the complaint-type catalogue.

use crate::StorageError;
use chrono::{Duration, Utc};
use fault_sync::{IncidentDraft, IncidentRef, IncidentStore};
use sqlx::{Row, SqlitePool};
use telemetry::FaultCandidate;
use tracing::debug;

pub struct SqliteIncidents {
    pool: SqlitePool,
}

impl SqliteIncidents {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the incident tables.
    pub async fn migrate(pool: &SqlitePool) -> Result<(), StorageError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS fault_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rtu_number TEXT NOT NULL,
                tag TEXT NOT NULL,
                tag_value TEXT NOT NULL,
                event_time TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT 'UNIFIED',
                created_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_fault_log_rtu_tag
             ON fault_log (rtu_number, tag, id)",
            "CREATE TABLE IF NOT EXISTS complaints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                complaint_id TEXT NOT NULL UNIQUE,
                fault_ref INTEGER NOT NULL REFERENCES fault_log(id),
                type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                tags TEXT NOT NULL,
                deadline TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS complaint_types (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                sla_hours INTEGER
            )",
            "CREATE TABLE IF NOT EXISTS status_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                complaint_ref INTEGER NOT NULL REFERENCES complaints(id),
                to_status TEXT NOT NULL,
                comment TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
            "INSERT OR IGNORE INTO counters (name, value) VALUES ('complaint', 0)",
        ];
        for statement in statements {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    /// Registers a complaint type with an optional SLA, for deadline
    /// resolution at persist time.
    pub async fn register_complaint_type(
        &self,
        name: &str,
        sla_hours: Option<i64>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO complaint_types (name, sla_hours) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET sla_hours = excluded.sla_hours",
        )
        .bind(name)
        .bind(sla_hours)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl IncidentStore for SqliteIncidents {
    type Error = StorageError;

    async fn latest_incident(
        &self,
        unit_id: &str,
        tag: &str,
    ) -> Result<Option<IncidentRef>, StorageError> {
        let row = sqlx::query(
            "SELECT c.id AS incident_id, c.status AS status
             FROM fault_log f
             LEFT JOIN complaints c ON c.fault_ref = f.id
             WHERE f.rtu_number = ? AND f.tag = ?
             ORDER BY f.id DESC
             LIMIT 1",
        )
        .bind(unit_id)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        // A fault record with no linked complaint is safe to recreate.
        let Some(id) = row.try_get::<Option<i64>, _>("incident_id")? else {
            return Ok(None);
        };
        let status = row.try_get::<String, _>("status")?;
        Ok(Some(IncidentRef { id, status }))
    }

    async fn persist(
        &self,
        candidate: &FaultCandidate,
        draft: &IncidentDraft,
    ) -> Result<i64, StorageError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let fault_id = sqlx::query(
            "INSERT INTO fault_log (rtu_number, tag, tag_value, event_time, source, created_at)
             VALUES (?, ?, ?, ?, 'UNIFIED', ?)
             RETURNING id",
        )
        .bind(&candidate.unit_id)
        .bind(&candidate.tag)
        .bind(candidate.value.normalized())
        .bind(candidate.event_time)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i64, _>("id")?;

        let sequence = sqlx::query(
            "UPDATE counters SET value = value + 1 WHERE name = 'complaint' RETURNING value",
        )
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i64, _>("value")?;
        let complaint_number = format!("CMP-{sequence:06}");

        let resolved = sqlx::query("SELECT name, sla_hours FROM complaint_types WHERE name = ?")
            .bind(&draft.complaint_type)
            .fetch_optional(&mut *tx)
            .await?;
        let (type_name, deadline) = match resolved {
            Some(row) => {
                let sla = row.try_get::<Option<i64>, _>("sla_hours")?;
                (
                    row.try_get::<String, _>("name")?,
                    sla.map(|hours| now + Duration::hours(hours)),
                )
            }
            None => {
                debug!(
                    complaint_type = %draft.complaint_type,
                    "Unknown complaint type, persisting without SLA deadline"
                );
                (draft.complaint_type.clone(), None)
            }
        };

        let incident_id = sqlx::query(
            "INSERT INTO complaints
                 (complaint_id, fault_ref, type, title, description, status, priority, tags, deadline, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&complaint_number)
        .bind(fault_id)
        .bind(&type_name)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.status)
        .bind(&draft.priority)
        .bind(&draft.tags)
        .bind(deadline)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i64, _>("id")?;

        sqlx::query(
            "INSERT INTO status_log (complaint_ref, to_status, comment, created_at)
             VALUES (?, ?, 'Automated fault sync', ?)",
        )
        .bind(incident_id)
        .bind(&draft.status)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(incident_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sqlx::sqlite::SqlitePoolOptions;
    use telemetry::TagValue;

    async fn store() -> SqliteIncidents {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteIncidents::migrate(&pool).await.unwrap();
        SqliteIncidents::new(pool)
    }

    fn candidate(unit: &str, tag: &str) -> FaultCandidate {
        FaultCandidate {
            unit_id: unit.into(),
            tag: tag.into(),
            value: TagValue::Number(0.0),
            event_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            description: "Power failure".into(),
            alarm_kind: "CRITICAL".into(),
            complaint_type: None,
            stats: None,
        }
    }

    fn draft() -> IncidentDraft {
        IncidentDraft {
            title: "Power failure at RTU 1001".into(),
            description: "Tag16 reported 0".into(),
            status: "REGISTERED".into(),
            priority: "CRITICAL".into(),
            complaint_type: "Street Lighting".into(),
            tags: "{}".into(),
        }
    }

    #[tokio::test]
    async fn test_persist_then_lookup_round_trip() {
        let store = store().await;
        assert!(store.latest_incident("1001", "Tag16").await.unwrap().is_none());

        let id = store.persist(&candidate("1001", "Tag16"), &draft()).await.unwrap();
        let found = store.latest_incident("1001", "Tag16").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.status, "REGISTERED");

        // Other keys unaffected.
        assert!(store.latest_incident("1001", "Tag8").await.unwrap().is_none());
        assert!(store.latest_incident("1002", "Tag16").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complaint_numbers_are_sequential() {
        let store = store().await;
        store.persist(&candidate("1001", "Tag16"), &draft()).await.unwrap();
        store.persist(&candidate("1002", "Tag16"), &draft()).await.unwrap();

        let row = sqlx::query("SELECT complaint_id FROM complaints ORDER BY id ASC")
            .fetch_all(&store.pool)
            .await
            .unwrap();
        let first: String = row[0].try_get("complaint_id").unwrap();
        let second: String = row[1].try_get("complaint_id").unwrap();
        assert_eq!(first, "CMP-000001");
        assert_eq!(second, "CMP-000002");
    }

    #[tokio::test]
    async fn test_sla_deadline_resolved_from_catalogue() {
        let store = store().await;
        store
            .register_complaint_type("Street Lighting", Some(48))
            .await
            .unwrap();
        store.persist(&candidate("1001", "Tag16"), &draft()).await.unwrap();

        let row = sqlx::query("SELECT deadline FROM complaints LIMIT 1")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        let deadline: Option<chrono::DateTime<Utc>> = row.try_get("deadline").unwrap();
        assert!(deadline.is_some());
    }

    #[tokio::test]
    async fn test_status_log_written_with_complaint() {
        let store = store().await;
        let id = store.persist(&candidate("1001", "Tag16"), &draft()).await.unwrap();

        let row = sqlx::query("SELECT complaint_ref, to_status FROM status_log")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(row.try_get::<i64, _>("complaint_ref").unwrap(), id);
        assert_eq!(row.try_get::<String, _>("to_status").unwrap(), "REGISTERED");
    }
}
