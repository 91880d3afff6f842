//! roster-store — SQLite persistence for enrolled identities and attendance.
//!
//! Implements the core's [`GallerySource`] and [`AttendanceStore`]. The
//! `attendance` table's primary key on `(identity_id, period_key)` is what
//! makes commits idempotent across workers and processes.

mod encoding;
mod schema;

use chrono::{DateTime, Utc};
use roster_core::{
    AttendanceRecord, AttendanceStore, CommitOutcome, Embedding, GallerySource, IdentityRecord,
    PeriodKey,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

pub use encoding::{decode_encoding, encode_embedding};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default database location: `$XDG_DATA_HOME/roster/roster.db`.
pub fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("roster")
        .join("roster.db")
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity already enrolled: {0}")]
    DuplicateIdentity(String),
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
    #[error("invalid database value: {0}")]
    InvalidDbValue(String),
}

impl StoreError {
    fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
        )
    }
}

impl From<StoreError> for roster_core::StoreError {
    fn from(err: StoreError) -> Self {
        if err.is_busy() {
            roster_core::StoreError::Unavailable(err.to_string())
        } else {
            roster_core::StoreError::Backend(err.to_string())
        }
    }
}

/// Enrolled identity as listed for administration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySummary {
    pub id: String,
    pub display_name: Option<String>,
    pub dim: usize,
    pub created_at: String,
}

/// One attendance row joined with the identity's display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceExportRow {
    pub identity_id: String,
    pub display_name: Option<String>,
    pub period_key: PeriodKey,
    pub committed_at: DateTime<Utc>,
}

/// Result of marking absentees for a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FinalizeReport {
    pub total: usize,
    pub marked_absent: usize,
}

/// SQLite-backed gallery and attendance store.
///
/// Each instance owns one connection. Separate instances (or processes)
/// may share a database file; uniqueness is enforced by SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(schema::SCHEMA_SQL)?;

        tracing::info!(path = %path.display(), journal_mode = %mode, "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a new identity. Fails if the id is already enrolled.
    pub fn enroll_identity(
        &self,
        id: &str,
        display_name: Option<&str>,
        embedding: &Embedding,
    ) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(StoreError::InvalidEmbedding("identity id is empty".into()));
        }
        if embedding.values.is_empty() {
            return Err(StoreError::InvalidEmbedding("embedding is empty".into()));
        }
        if !embedding.is_finite() {
            return Err(StoreError::InvalidEmbedding(
                "embedding contains non-finite values".into(),
            ));
        }

        let blob = encode_embedding(embedding);
        let inserted = self.conn().execute(
            "INSERT INTO identities (id, display_name, encoding, length, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                display_name,
                blob,
                embedding.dim() as i64,
                Utc::now().to_rfc3339()
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::info!(identity = id, dim = embedding.dim(), "identity enrolled");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateIdentity(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove an identity. Attendance history is kept. Returns false if unknown.
    pub fn remove_identity(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM identities WHERE id = ?1", params![id])?;
        if removed > 0 {
            tracing::info!(identity = id, "identity removed");
        }
        Ok(removed > 0)
    }

    pub fn identity_summaries(&self) -> Result<Vec<IdentitySummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, display_name, length, created_at FROM identities ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            let length: i64 = row.get(2)?;
            Ok(IdentitySummary {
                id: row.get(0)?,
                display_name: row.get(1)?,
                dim: usize::try_from(length).unwrap_or(0),
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// All identity rows, decoded but not validated.
    pub fn identity_records(&self) -> Result<Vec<IdentityRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, display_name, encoding, length FROM identities ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(2)?;
            let length: i64 = row.get(3)?;
            let declared_len = usize::try_from(length).unwrap_or(0);
            Ok(IdentityRecord {
                id: row.get(0)?,
                display_name: row.get(1)?,
                values: decode_encoding(&blob, declared_len),
                declared_len,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn has_attendance(&self, identity_id: &str, period: &PeriodKey) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM attendance WHERE identity_id = ?1 AND period_key = ?2",
                params![identity_id, period.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert an attendance row unless one exists. A single atomic statement.
    pub fn record_attendance(&self, identity_id: &str, period: &PeriodKey) -> Result<CommitOutcome> {
        let changed = self.conn().execute(
            "INSERT INTO attendance (identity_id, period_key, committed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(identity_id, period_key) DO NOTHING",
            params![identity_id, period.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(if changed == 1 {
            CommitOutcome::Created
        } else {
            CommitOutcome::AlreadyPresent
        })
    }

    pub fn records_for_period(&self, period: &PeriodKey) -> Result<Vec<AttendanceRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT identity_id, committed_at FROM attendance
             WHERE period_key = ?1 ORDER BY committed_at, identity_id",
        )?;
        let rows = stmt.query_map(params![period.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (identity_id, committed_at) = row?;
            records.push(AttendanceRecord {
                identity_id,
                period_key: period.clone(),
                committed_at: parse_timestamp(&committed_at)?,
            });
        }
        Ok(records)
    }

    /// Attendance between `from` and `to` inclusive, newest period first.
    pub fn export_range(&self, from: &PeriodKey, to: &PeriodKey) -> Result<Vec<AttendanceExportRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT a.identity_id, i.display_name, a.period_key, a.committed_at
             FROM attendance a
             LEFT JOIN identities i ON i.id = a.identity_id
             WHERE a.period_key BETWEEN ?1 AND ?2
             ORDER BY a.period_key DESC, a.committed_at, a.identity_id",
        )?;
        let rows = stmt.query_map(params![from.as_str(), to.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (identity_id, display_name, period_key, committed_at) = row?;
            let period_key = PeriodKey::parse(&period_key)
                .map_err(|e| StoreError::InvalidDbValue(format!("period key {period_key}: {e}")))?;
            out.push(AttendanceExportRow {
                identity_id,
                display_name,
                period_key,
                committed_at: parse_timestamp(&committed_at)?,
            });
        }
        Ok(out)
    }

    /// Mark every enrolled identity without attendance for `period` as absent.
    ///
    /// Safe to run more than once; already-marked absentees are not counted again.
    pub fn finalize_period(&self, period: &PeriodKey) -> Result<FinalizeReport> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let total: i64 = tx.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
        let marked_absent = tx.execute(
            "INSERT OR IGNORE INTO absences (identity_id, period_key)
             SELECT id, ?1 FROM identities
             WHERE id NOT IN (SELECT identity_id FROM attendance WHERE period_key = ?1)",
            params![period.as_str()],
        )?;
        tx.commit()?;

        let report = FinalizeReport {
            total: usize::try_from(total).unwrap_or(0),
            marked_absent,
        };
        tracing::info!(
            period = %period,
            total = report.total,
            marked_absent = report.marked_absent,
            "attendance finalized"
        );
        Ok(report)
    }

    pub fn absentees(&self, period: &PeriodKey) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT identity_id FROM absences WHERE period_key = ?1 ORDER BY identity_id",
        )?;
        let rows = stmt.query_map(params![period.as_str()], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl GallerySource for SqliteStore {
    fn list_identities(&self) -> std::result::Result<Vec<IdentityRecord>, roster_core::StoreError> {
        Ok(self.identity_records()?)
    }
}

impl AttendanceStore for SqliteStore {
    fn period_has_record(
        &self,
        identity_id: &str,
        period: &PeriodKey,
    ) -> std::result::Result<bool, roster_core::StoreError> {
        Ok(self.has_attendance(identity_id, period)?)
    }

    fn insert_record_if_absent(
        &self,
        identity_id: &str,
        period: &PeriodKey,
    ) -> std::result::Result<CommitOutcome, roster_core::StoreError> {
        Ok(self.record_attendance(identity_id, period)?)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidDbValue(format!("timestamp {value}: {e}")))
}
