//! `SQLite`-backed implementation of [`CheckpointStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety; the lock also
//! linearizes saves so the per-run sequence check and the insert happen
//! as one unit.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use stockflow_types::{RunId, RunState, RunSummary};

use crate::error::{self, CheckpointError};
use crate::store::CheckpointStore;

/// Idempotent DDL for the checkpoint table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS run_checkpoints (
    run_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    subject TEXT NOT NULL,
    status TEXT NOT NULL,
    state_json TEXT NOT NULL,
    started_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (run_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_run_checkpoints_started
    ON run_checkpoints (started_at);
";

/// `SQLite`-backed checkpoint storage.
///
/// Create with [`SqliteCheckpointStore::open`] for file-backed
/// persistence or [`SqliteCheckpointStore::in_memory`] for tests.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create a `SQLite` checkpoint database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if the directory can't be created,
    /// or [`CheckpointError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Sqlite`] if the in-memory database
    /// can't be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CheckpointError::LockPoisoned)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, state: &RunState) -> error::Result<()> {
        let json = serde_json::to_string(state)?;
        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;

        let latest: Option<u64> = tx
            .query_row(
                "SELECT MAX(seq) FROM run_checkpoints WHERE run_id = ?1",
                [state.run_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        if let Some(latest) = latest {
            if state.checkpoint_seq <= latest {
                return Err(CheckpointError::StaleSequence {
                    run_id: state.run_id.clone(),
                    seq: state.checkpoint_seq,
                    latest,
                });
            }
        }

        #[allow(clippy::cast_possible_wrap)]
        tx.execute(
            "INSERT INTO run_checkpoints (run_id, seq, subject, status, state_json, started_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                state.run_id.as_str(),
                state.checkpoint_seq as i64,
                state.subject,
                state.status.as_str(),
                json,
                state.started_at,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn load_latest(&self, run_id: &RunId) -> error::Result<Option<RunState>> {
        let conn = self.lock_conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT state_json FROM run_checkpoints \
                 WHERE run_id = ?1 ORDER BY seq DESC LIMIT 1",
                [run_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn list(&self, run_id: &RunId, limit: usize) -> error::Result<Vec<RunState>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT state_json FROM run_checkpoints \
             WHERE run_id = ?1 ORDER BY seq DESC LIMIT ?2",
        )?;

        #[allow(clippy::cast_possible_wrap)]
        let rows = stmt.query_map(
            rusqlite::params![run_id.as_str(), limit as i64],
            |row| row.get::<_, String>(0),
        )?;

        let mut snapshots = Vec::new();
        for json in rows {
            snapshots.push(serde_json::from_str(&json?)?);
        }
        Ok(snapshots)
    }

    fn list_runs(&self, limit: usize) -> error::Result<Vec<RunSummary>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT state_json FROM run_checkpoints rc \
             WHERE seq = (SELECT MAX(seq) FROM run_checkpoints WHERE run_id = rc.run_id) \
             ORDER BY started_at DESC LIMIT ?1",
        )?;

        #[allow(clippy::cast_possible_wrap)]
        let rows = stmt.query_map([limit as i64], |row| row.get::<_, String>(0))?;

        let mut summaries = Vec::new();
        for json in rows {
            let state: RunState = serde_json::from_str(&json?)?;
            summaries.push(state.summary());
        }
        Ok(summaries)
    }
}
