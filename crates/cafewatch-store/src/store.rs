//! SQLite persistence for the event log, employee scores and visitor samples.

use cafewatch_core::{EmployeeStatus, EventKind, PersistOp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for persistence operations.
pub trait Store {
    /// Apply one operation stamped with the time it was produced.
    fn apply(&mut self, op: &PersistOp, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// One row of `employee_performance`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeRecord {
    pub name: String,
    pub cups: u64,
    pub last_seen: String,
    pub status: String,
}

/// One row of `system_logs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub timestamp: String,
    pub event: String,
    pub detail: String,
}

/// Most recent `visitor_logs` sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisitorSample {
    pub timestamp: Option<String>,
    pub camera_id: Option<String>,
    pub total_in: u64,
    pub current_occupancy: u64,
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;

        let store = Self { conn };
        store.init_schema()?;
        tracing::info!(path = %path.display(), "store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS system_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event TEXT NOT NULL,
                detail TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS employee_performance (
                name TEXT PRIMARY KEY,
                cups INTEGER NOT NULL DEFAULT 0,
                last_seen TEXT NOT NULL,
                status TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS visitor_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                camera_id TEXT NOT NULL,
                total_in INTEGER NOT NULL,
                current_occupancy INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_system_logs_timestamp ON system_logs(timestamp);",
        )?;
        Ok(())
    }

    pub fn log_event(&self, kind: EventKind, detail: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO system_logs (timestamp, event, detail) VALUES (?1, ?2, ?3)",
            params![at.to_rfc3339(), kind.as_str(), detail],
        )?;
        Ok(())
    }

    /// Insert with `cups = delta`, or add `delta` to an existing row.
    /// `last_seen` and `status` are always overwritten.
    pub fn update_employee(
        &self,
        name: &str,
        cups_delta: u32,
        status: EmployeeStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO employee_performance (name, cups, last_seen, status)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                cups = cups + excluded.cups,
                last_seen = excluded.last_seen,
                status = excluded.status",
            params![name, cups_delta, at.to_rfc3339(), status.as_str()],
        )?;
        Ok(())
    }

    pub fn record_visitor_stats(
        &self,
        camera_id: &str,
        total_in: u64,
        current_occupancy: usize,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO visitor_logs (timestamp, camera_id, total_in, current_occupancy)
             VALUES (?1, ?2, ?3, ?4)",
            params![at.to_rfc3339(), camera_id, total_in as i64, current_occupancy as i64],
        )?;
        Ok(())
    }

    /// All employees, highest score first.
    pub fn employee_scores(&self) -> Result<Vec<EmployeeRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, cups, last_seen, status FROM employee_performance
             ORDER BY cups DESC, name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EmployeeRecord {
                name: row.get(0)?,
                cups: row.get::<_, i64>(1)?.max(0) as u64,
                last_seen: row.get(2)?,
                status: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Latest visitor sample, or zeros when none has been recorded.
    pub fn latest_visitor_stats(&self) -> Result<VisitorSample, StoreError> {
        let sample = self
            .conn
            .query_row(
                "SELECT timestamp, camera_id, total_in, current_occupancy FROM visitor_logs
                 ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(VisitorSample {
                        timestamp: Some(row.get(0)?),
                        camera_id: Some(row.get(1)?),
                        total_in: row.get::<_, i64>(2)?.max(0) as u64,
                        current_occupancy: row.get::<_, i64>(3)?.max(0) as u64,
                    })
                },
            )
            .optional()?;
        Ok(sample.unwrap_or_default())
    }

    /// Most recent events, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, event, detail FROM system_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(EventRecord {
                timestamp: row.get(0)?,
                event: row.get(1)?,
                detail: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl Store for SqliteStore {
    fn apply(&mut self, op: &PersistOp, at: DateTime<Utc>) -> Result<(), StoreError> {
        match op {
            PersistOp::LogEvent { kind, detail } => self.log_event(*kind, detail, at),
            PersistOp::UpdateEmployee {
                name,
                cups_delta,
                status,
            } => self.update_employee(name, *cups_delta, *status, at),
            PersistOp::VisitorStats {
                camera_id,
                total_in,
                current_occupancy,
            } => self.record_visitor_stats(camera_id, *total_in, *current_occupancy, at),
        }
    }
}
