//! SQLite ledger (WAL mode, one connection behind a mutex).

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Ledger, LedgerRow, RECORD_SQL, SCHEMA, WAL_PRAGMAS};
use crate::engine::hashing::{Checksum, checksum_from_blob};
use crate::triplet::ItemKind;

pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

/// Enable WAL and apply schema to an open connection (idempotent).
fn apply_wal_and_schema(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .context("enable WAL")?;
    conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    Ok(())
}

impl SqliteLedger {
    /// Open or create the ledger and ensure schema + WAL.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open ledger {}", path.display()))?;
        apply_wal_and_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory ledger with the same schema (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory ledger")?;
        conn.execute_batch(SCHEMA).context("create schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_folder_flag(kind: ItemKind) -> i64 {
    i64::from(kind.is_folder())
}

impl Ledger for SqliteLedger {
    fn local_to_remote(&self, local_path: &str, kind: ItemKind) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT remote_path FROM items WHERE local_path = ?1 AND is_folder = ?2",
                (local_path, is_folder_flag(kind)),
                |row| row.get(0),
            )
            .optional()
            .context("look up remote path")
    }

    fn remote_to_local(&self, remote_path: &str, kind: ItemKind) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT local_path FROM items WHERE remote_path = ?1 AND is_folder = ?2",
                (remote_path, is_folder_flag(kind)),
                |row| row.get(0),
            )
            .optional()
            .context("look up local path")
    }

    fn checksum(&self, local_path: &str) -> Result<Option<Checksum>> {
        let blob: Option<Option<Vec<u8>>> = self
            .conn()
            .query_row(
                "SELECT checksum FROM items WHERE local_path = ?1 AND is_folder = 0",
                [local_path],
                |row| row.get(0),
            )
            .optional()
            .context("look up checksum")?;
        Ok(checksum_from_blob(blob.flatten()))
    }

    fn remote_mtime(&self, remote_path: &str) -> Result<Option<i64>> {
        let mtime: Option<Option<i64>> = self
            .conn()
            .query_row(
                "SELECT remote_mtime FROM items WHERE remote_path = ?1 AND is_folder = 0",
                [remote_path],
                |row| row.get(0),
            )
            .optional()
            .context("look up remote mtime")?;
        Ok(mtime.flatten())
    }

    fn rows(&self) -> Result<Vec<LedgerRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT local_path, remote_path, is_folder, checksum, remote_mtime \
             FROM items ORDER BY local_path",
        )?;
        let rows = stmt.query_map([], |row| {
            let is_folder: i64 = row.get(2)?;
            let checksum: Option<Vec<u8>> = row.get(3)?;
            Ok(LedgerRow {
                local_path: row.get(0)?,
                remote_path: row.get(1)?,
                kind: ItemKind::from_is_dir(is_folder != 0),
                checksum: checksum_from_blob(checksum),
                remote_mtime: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn record(&self, row: &LedgerRow) -> Result<()> {
        self.conn()
            .execute(
                RECORD_SQL,
                (
                    row.local_path.as_str(),
                    row.remote_path.as_str(),
                    is_folder_flag(row.kind),
                    row.checksum.as_ref().map(|h| h.as_slice()),
                    row.remote_mtime,
                ),
            )
            .with_context(|| format!("record {}", row.local_path))?;
        Ok(())
    }

    fn remove(&self, local_path: &str, kind: ItemKind) -> Result<()> {
        self.conn()
            .execute(
                "DELETE FROM items WHERE local_path = ?1 AND is_folder = ?2",
                (local_path, is_folder_flag(kind)),
            )
            .with_context(|| format!("remove {local_path}"))?;
        Ok(())
    }

    fn changelog_token(&self) -> Result<Option<String>> {
        self.conn()
            .query_row("SELECT token FROM changelog WHERE id = 0", [], |row| {
                row.get(0)
            })
            .optional()
            .context("read change token")
    }

    fn set_changelog_token(&self, token: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO changelog (id, token) VALUES (0, ?1)",
                [token],
            )
            .context("store change token")?;
        Ok(())
    }
}
