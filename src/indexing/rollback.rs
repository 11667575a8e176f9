//! Migration journal with payload backup.
//!
//! A migration is `in_progress` from `start` until `complete` or
//! `mark_rolled_back`. Vector-index payloads captured during a migration
//! stay retrievable until `cleanup_old_backups` removes them — and cleanup
//! only ever touches payloads whose migration has finished, one way or the
//! other.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    InProgress,
    Completed,
    RolledBack,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::Completed => "completed",
            MigrationStatus::RolledBack => "rolled_back",
        }
    }

    fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "in_progress" => Ok(MigrationStatus::InProgress),
            "completed" => Ok(MigrationStatus::Completed),
            "rolled_back" => Ok(MigrationStatus::RolledBack),
            other => Err(AppError::Migration(format!("unknown migration status: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub migration_id: String,
    pub site: String,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub status: MigrationStatus,
    pub old_point_ids: Vec<String>,
    pub new_chunk_ids: Vec<String>,
}

/// A backed-up vector-index payload, keyed by its point id.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupPayload {
    pub point_id: String,
    pub payload: serde_json::Value,
}

pub struct RollbackManager {
    db_path: PathBuf,
}

impl RollbackManager {
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Migration(format!("rollback: cannot create {}: {e}", parent.display()))
            })?;
        }
        let manager = Self { db_path: db_path.to_path_buf() };
        let conn = manager.open_conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS migration_records (
                migration_id TEXT PRIMARY KEY,
                site TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                status TEXT NOT NULL,
                old_point_ids_json TEXT,
                new_chunk_ids_json TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_site ON migration_records(site);
            CREATE INDEX IF NOT EXISTS idx_status ON migration_records(status);

            CREATE TABLE IF NOT EXISTS qdrant_backup (
                point_id TEXT PRIMARY KEY,
                migration_id TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (migration_id) REFERENCES migration_records(migration_id)
            );

            CREATE INDEX IF NOT EXISTS idx_backup_migration ON qdrant_backup(migration_id);
            ",
        )
        .map_err(|e| AppError::Migration(format!("rollback: initialize schema: {e}")))?;
        Ok(manager)
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path).map_err(|e| {
            AppError::Migration(format!("rollback: open {}: {e}", self.db_path.display()))
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Migration(format!("rollback: set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| AppError::Migration(format!("rollback: set foreign_keys ON: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Migration(format!("rollback: set busy_timeout: {e}")))?;
        Ok(conn)
    }

    /// Open a new `in_progress` migration and return its id.
    pub fn start(&self, site: &str) -> Result<String, AppError> {
        let migration_id = uuid::Uuid::new_v4().to_string();
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO migration_records
             (migration_id, site, started_at, status, old_point_ids_json, new_chunk_ids_json)
             VALUES (?1, ?2, ?3, 'in_progress', '[]', '[]')",
            params![migration_id, site, now_iso8601()],
        )
        .map_err(|e| AppError::Migration(format!("rollback: start migration: {e}")))?;
        Ok(migration_id)
    }

    /// Remember which points the migration is about to replace.
    pub fn record_old_points(&self, migration_id: &str, point_ids: &[String]) -> Result<(), AppError> {
        let json = serde_json::to_string(point_ids)
            .map_err(|e| AppError::Migration(format!("rollback: serialize point ids: {e}")))?;
        let conn = self.open_conn()?;
        let updated = conn
            .execute(
                "UPDATE migration_records SET old_point_ids_json = ?1 WHERE migration_id = ?2",
                params![json, migration_id],
            )
            .map_err(|e| AppError::Migration(format!("rollback: record old points: {e}")))?;
        ensure_known(updated, migration_id)
    }

    /// Capture payloads so a rollback can restore them. Every payload must
    /// reference a live migration record (enforced by the FK).
    pub fn backup_payloads(
        &self,
        migration_id: &str,
        payloads: &[BackupPayload],
    ) -> Result<(), AppError> {
        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Migration(format!("rollback: begin backup tx: {e}")))?;

        let now = now_iso8601();
        for p in payloads {
            let payload_json = serde_json::to_string(&p.payload)
                .map_err(|e| AppError::Migration(format!("rollback: serialize payload: {e}")))?;
            tx.execute(
                "INSERT OR REPLACE INTO qdrant_backup
                 (point_id, migration_id, payload_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![p.point_id, migration_id, payload_json, now],
            )
            .map_err(|e| AppError::Migration(format!("rollback: backup {}: {e}", p.point_id)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Migration(format!("rollback: commit backup tx: {e}")))
    }

    /// Close the migration successfully, recording the replacement chunks.
    pub fn complete(&self, migration_id: &str, new_chunk_ids: &[String]) -> Result<(), AppError> {
        let json = serde_json::to_string(new_chunk_ids)
            .map_err(|e| AppError::Migration(format!("rollback: serialize chunk ids: {e}")))?;
        let conn = self.open_conn()?;
        let updated = conn
            .execute(
                "UPDATE migration_records
                 SET status = 'completed', completed_at = ?1, new_chunk_ids_json = ?2
                 WHERE migration_id = ?3",
                params![now_iso8601(), json, migration_id],
            )
            .map_err(|e| AppError::Migration(format!("rollback: complete migration: {e}")))?;
        ensure_known(updated, migration_id)
    }

    /// Abandon the migration. Backed-up payloads stay retrievable.
    pub fn mark_rolled_back(&self, migration_id: &str) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let updated = conn
            .execute(
                "UPDATE migration_records
                 SET status = 'rolled_back', completed_at = ?1
                 WHERE migration_id = ?2",
                params![now_iso8601(), migration_id],
            )
            .map_err(|e| AppError::Migration(format!("rollback: mark rolled back: {e}")))?;
        ensure_known(updated, migration_id)
    }

    pub fn get_migration(&self, migration_id: &str) -> Result<Option<MigrationRecord>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM migration_records WHERE migration_id = ?1")
            .map_err(|e| AppError::Migration(format!("rollback: prepare get_migration: {e}")))?;
        let record = stmt
            .query_row(params![migration_id], row_to_record)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(|e| AppError::Migration(format!("rollback: get_migration: {e}")))?;
        record.transpose()
    }

    /// All migrations for a site, most recent first.
    pub fn migrations_for_site(&self, site: &str) -> Result<Vec<MigrationRecord>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM migration_records WHERE site = ?1 ORDER BY started_at DESC")
            .map_err(|e| AppError::Migration(format!("rollback: prepare site query: {e}")))?;
        let rows = stmt
            .query_map(params![site], row_to_record)
            .map_err(|e| AppError::Migration(format!("rollback: query site migrations: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            records
                .push(row.map_err(|e| AppError::Migration(format!("rollback: map row: {e}")))??);
        }
        Ok(records)
    }

    pub fn get_backup_payloads(&self, migration_id: &str) -> Result<Vec<BackupPayload>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare("SELECT point_id, payload_json FROM qdrant_backup WHERE migration_id = ?1")
            .map_err(|e| AppError::Migration(format!("rollback: prepare backup query: {e}")))?;
        let rows = stmt
            .query_map(params![migration_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| AppError::Migration(format!("rollback: query backups: {e}")))?;

        let mut payloads = Vec::new();
        for row in rows {
            let (point_id, payload_json) =
                row.map_err(|e| AppError::Migration(format!("rollback: map backup row: {e}")))?;
            let payload = serde_json::from_str(&payload_json)
                .map_err(|e| AppError::Migration(format!("rollback: payload not JSON: {e}")))?;
            payloads.push(BackupPayload { point_id, payload });
        }
        Ok(payloads)
    }

    /// Delete backups older than `days` whose migration is finished
    /// (`completed` or `rolled_back`). In-progress migrations keep their
    /// backups no matter how old. Returns the number of rows removed.
    pub fn cleanup_old_backups(&self, days: u32) -> Result<usize, AppError> {
        let conn = self.open_conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM qdrant_backup
                 WHERE migration_id IN (
                     SELECT migration_id FROM migration_records
                     WHERE status IN ('completed', 'rolled_back')
                     AND datetime(completed_at) <= datetime('now', ?1)
                 )",
                params![format!("-{days} days")],
            )
            .map_err(|e| AppError::Migration(format!("rollback: cleanup: {e}")))?;
        Ok(deleted)
    }
}

fn ensure_known(updated: usize, migration_id: &str) -> Result<(), AppError> {
    if updated == 0 {
        return Err(AppError::Migration(format!("unknown migration id: {migration_id}")));
    }
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Result<MigrationRecord, AppError>> {
    let migration_id: String = row.get("migration_id")?;
    let site: String = row.get("site")?;
    let started_at: String = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let status: String = row.get("status")?;
    let old_points: Option<String> = row.get("old_point_ids_json")?;
    let new_chunks: Option<String> = row.get("new_chunk_ids_json")?;

    Ok(build_record(
        migration_id,
        site,
        started_at,
        completed_at,
        status,
        old_points,
        new_chunks,
    ))
}

fn build_record(
    migration_id: String,
    site: String,
    started_at: String,
    completed_at: Option<String>,
    status: String,
    old_points: Option<String>,
    new_chunks: Option<String>,
) -> Result<MigrationRecord, AppError> {
    Ok(MigrationRecord {
        migration_id,
        site,
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        status: MigrationStatus::parse(&status)?,
        old_point_ids: parse_id_list(old_points.as_deref())?,
        new_chunk_ids: parse_id_list(new_chunks.as_deref())?,
    })
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .map_err(|e| AppError::Migration(format!("rollback: bad timestamp '{raw}': {e}")))
}

fn parse_id_list(raw: Option<&str>) -> Result<Vec<String>, AppError> {
    match raw {
        None | Some("") => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json)
            .map_err(|e| AppError::Migration(format!("rollback: bad id list: {e}"))),
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, RollbackManager) {
        let dir = TempDir::new().unwrap();
        let m = RollbackManager::open(&dir.path().join("indexing").join("migrations.db")).unwrap();
        (dir, m)
    }

    fn payloads(n: usize) -> Vec<BackupPayload> {
        (0..n)
            .map(|i| BackupPayload {
                point_id: format!("point-{i}"),
                payload: serde_json::json!({"name": format!("摘要 {i}"), "site": "example.com"}),
            })
            .collect()
    }

    #[test]
    fn start_creates_in_progress_record() {
        let (_dir, m) = manager();
        let id = m.start("example.com").unwrap();
        let record = m.get_migration(&id).unwrap().unwrap();
        assert_eq!(record.status, MigrationStatus::InProgress);
        assert_eq!(record.site, "example.com");
        assert!(record.completed_at.is_none());
        assert!(record.old_point_ids.is_empty());
    }

    #[test]
    fn full_lifecycle_complete() {
        let (_dir, m) = manager();
        let id = m.start("example.com").unwrap();
        m.record_old_points(&id, &["p1".into(), "p2".into()]).unwrap();
        m.backup_payloads(&id, &payloads(2)).unwrap();
        m.complete(&id, &["https://x::chunk::0".into()]).unwrap();

        let record = m.get_migration(&id).unwrap().unwrap();
        assert_eq!(record.status, MigrationStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.old_point_ids, vec!["p1", "p2"]);
        assert_eq!(record.new_chunk_ids, vec!["https://x::chunk::0"]);
    }

    #[test]
    fn rollback_keeps_backups_retrievable() {
        let (_dir, m) = manager();
        let id = m.start("example.com").unwrap();
        m.backup_payloads(&id, &payloads(3)).unwrap();
        m.mark_rolled_back(&id).unwrap();

        assert_eq!(m.get_migration(&id).unwrap().unwrap().status, MigrationStatus::RolledBack);
        let restored = m.get_backup_payloads(&id).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored[0].payload["site"], "example.com");
    }

    #[test]
    fn cleanup_removes_only_finished_migrations() {
        let (_dir, m) = manager();

        let active = m.start("example.com").unwrap();
        m.backup_payloads(&active, &payloads(1)).unwrap();

        let rolled = m.start("example.com").unwrap();
        m.backup_payloads(
            &rolled,
            &[BackupPayload { point_id: "rolled-p".into(), payload: serde_json::json!({}) }],
        )
        .unwrap();
        m.mark_rolled_back(&rolled).unwrap();

        // Day 0 threshold: everything finished qualifies immediately.
        let removed = m.cleanup_old_backups(0).unwrap();
        assert_eq!(removed, 1);
        assert!(m.get_backup_payloads(&rolled).unwrap().is_empty());
        // In-progress backups survive.
        assert_eq!(m.get_backup_payloads(&active).unwrap().len(), 1);
    }

    #[test]
    fn unknown_migration_id_errors() {
        let (_dir, m) = manager();
        assert!(m.get_migration("nope").unwrap().is_none());
        assert!(m.complete("nope", &[]).is_err());
        assert!(m.mark_rolled_back("nope").is_err());
        assert!(m.record_old_points("nope", &[]).is_err());
    }

    #[test]
    fn backup_requires_live_migration() {
        let (_dir, m) = manager();
        let result = m.backup_payloads("ghost-migration", &payloads(1));
        assert!(result.is_err(), "FK must reject orphan backups");
    }

    #[test]
    fn site_history_is_most_recent_first() {
        let (_dir, m) = manager();
        let a = m.start("example.com").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let b = m.start("example.com").unwrap();
        m.start("other.com").unwrap();

        let records = m.migrations_for_site("example.com").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].migration_id, b);
        assert_eq!(records[1].migration_id, a);
    }
}
