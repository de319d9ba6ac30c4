//! Append-only audit log of operator actions, stored in SQLite.

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit store: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub at: String,
    pub action: String,
    pub target: String,
    pub outcome: String,
    pub detail: Option<String>,
}

pub struct AuditStore {
    conn: Mutex<Connection>,
}

impl AuditStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, AuditError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                at TEXT NOT NULL,
                action TEXT NOT NULL,
                target TEXT NOT NULL,
                outcome TEXT NOT NULL,
                detail TEXT
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert(
        &self,
        action: &str,
        target: &str,
        outcome: Outcome,
        detail: Option<&str>,
    ) -> Result<(), AuditError> {
        let at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO audit_log (at, action, target, outcome, detail) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![at, action, target, outcome.as_str(), detail],
        )?;
        Ok(())
    }

    /// Like [`insert`](Self::insert), but a failure is only logged.
    pub fn record(&self, action: &str, target: &str, outcome: Outcome, detail: Option<&str>) {
        if let Err(err) = self.insert(action, target, outcome, detail) {
            tracing::error!(action, target, %err, "failed to write audit record");
        }
    }

    /// Most recent records first.
    pub fn list(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT id, at, action, target, outcome, detail
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(AuditRecord {
                id: row.get(0)?,
                at: row.get(1)?,
                action: row.get(2)?,
                target: row.get(3)?,
                outcome: row.get(4)?,
                detail: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
