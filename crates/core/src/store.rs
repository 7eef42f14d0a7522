// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence boundary for sync state.
//!
//! [`Store`] is a plain key/record store for checkpoints and pending
//! mutations. [`SqliteStore`] keeps each record as a JSON payload next to an
//! indexed status column.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::checkpoint::SyncCheckpoint;
use crate::error::{Error, Result};
use crate::model::{MutationKind, PendingMutation, SyncStatus};

/// Storage used by the sync orchestrator.
pub trait Store: Send + Sync {
    fn load_checkpoint(&self, user_id: &str) -> Result<Option<SyncCheckpoint>>;

    fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()>;

    /// Ids of mutations of `kind` currently in `status`, oldest first.
    fn list_pending_mutations(&self, kind: MutationKind, status: SyncStatus)
        -> Result<Vec<String>>;

    fn load_mutation(&self, kind: MutationKind, id: &str) -> Result<Option<PendingMutation>>;

    /// Moves a mutation to `status`, enforcing the allowed transitions.
    fn mark_mutation_status(&self, kind: MutationKind, id: &str, status: SyncStatus)
        -> Result<()>;

    /// Inserts or replaces a mutation record.
    fn save_mutation(&self, mutation: &PendingMutation) -> Result<()>;

    fn delete_mutation(&self, kind: MutationKind, id: &str) -> Result<()>;
}

/// SQL schema for the sync store.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    user_id TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mutations (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    status TEXT NOT NULL,
    payload TEXT NOT NULL,
    seq INTEGER NOT NULL,
    PRIMARY KEY (kind, id)
);

CREATE INDEX IF NOT EXISTS idx_mutations_status ON mutations(kind, status, seq);
"#;

/// SQLite implementation of [`Store`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) a store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StoreUnavailable("connection lock poisoned".to_string()))
    }

    /// Counts mutations per kind and status, for status reporting.
    pub fn count_mutations(&self) -> Result<Vec<(MutationKind, SyncStatus, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, status, COUNT(*) FROM mutations GROUP BY kind, status ORDER BY kind, status",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (kind, status, count) = row?;
            counts.push((kind.parse()?, status.parse()?, count));
        }
        Ok(counts)
    }
}

impl Store for SqliteStore {
    fn load_checkpoint(&self, user_id: &str) -> Result<Option<SyncCheckpoint>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM checkpoints WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(Error::from))
            .transpose()
    }

    fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        let payload = serde_json::to_string(checkpoint)?;
        self.conn()?.execute(
            "INSERT INTO checkpoints (user_id, payload) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET payload = excluded.payload",
            params![checkpoint.user_id, payload],
        )?;
        Ok(())
    }

    fn list_pending_mutations(
        &self,
        kind: MutationKind,
        status: SyncStatus,
    ) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id FROM mutations WHERE kind = ?1 AND status = ?2 ORDER BY seq")?;
        let ids = stmt
            .query_map(params![kind.as_str(), status.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn load_mutation(&self, kind: MutationKind, id: &str) -> Result<Option<PendingMutation>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM mutations WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let mutation: PendingMutation = serde_json::from_str(&payload)?;
        if mutation.kind() != kind {
            return Err(Error::CorruptedData(format!(
                "{} {} stored with a {} payload",
                kind,
                id,
                mutation.kind()
            )));
        }
        Ok(Some(mutation))
    }

    fn mark_mutation_status(
        &self,
        kind: MutationKind,
        id: &str,
        status: SyncStatus,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let payload: Option<String> = tx
            .query_row(
                "SELECT payload FROM mutations WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload) = payload else {
            return Err(Error::MutationNotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            });
        };

        let mut mutation: PendingMutation = serde_json::from_str(&payload)?;
        let current = mutation.sync_status();
        current.check_transition(status)?;
        if current == status {
            return Ok(());
        }

        mutation.set_sync_status(status);
        tx.execute(
            "UPDATE mutations SET status = ?3, payload = ?4 WHERE kind = ?1 AND id = ?2",
            params![
                kind.as_str(),
                id,
                status.as_str(),
                serde_json::to_string(&mutation)?
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn save_mutation(&self, mutation: &PendingMutation) -> Result<()> {
        let payload = serde_json::to_string(mutation)?;
        let status = mutation.sync_status();
        let conn = self.conn()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT status FROM mutations WHERE kind = ?1 AND id = ?2",
                params![mutation.kind().as_str(), mutation.id()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing) = existing {
            let existing: SyncStatus = existing.parse()?;
            if existing == SyncStatus::Completed && status != SyncStatus::Completed {
                return Err(Error::InvalidTransition {
                    from: existing.to_string(),
                    to: status.to_string(),
                    valid_targets: existing.valid_targets(),
                });
            }
        }

        conn.execute(
            "INSERT INTO mutations (kind, id, status, payload, seq)
             VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(seq), 0) + 1 FROM mutations))
             ON CONFLICT(kind, id) DO UPDATE SET status = excluded.status, payload = excluded.payload",
            params![
                mutation.kind().as_str(),
                mutation.id(),
                status.as_str(),
                payload
            ],
        )?;
        Ok(())
    }

    fn delete_mutation(&self, kind: MutationKind, id: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM mutations WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
