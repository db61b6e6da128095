//! Ledger: the persistent record of the last synchronized state of every item.

mod sqlite;

pub use sqlite::SqliteLedger;

use anyhow::Result;

use crate::engine::hashing::Checksum;
use crate::triplet::ItemKind;

/// One synchronized item. Paths are relative and `/`-separated, without a folder marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerRow {
    pub local_path: String,
    pub remote_path: String,
    pub kind: ItemKind,
    /// Content checksum at the time of the last sync (files only).
    pub checksum: Option<Checksum>,
    /// Remote modification time at the time of the last sync, in ns (files only).
    pub remote_mtime: Option<i64>,
}

impl LedgerRow {
    pub fn folder(local_path: &str, remote_path: &str) -> Self {
        Self {
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
            kind: ItemKind::Folder,
            checksum: None,
            remote_mtime: None,
        }
    }

    pub fn file(
        local_path: &str,
        remote_path: &str,
        checksum: Checksum,
        remote_mtime: Option<i64>,
    ) -> Self {
        Self {
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
            kind: ItemKind::File,
            checksum: Some(checksum),
            remote_mtime,
        }
    }
}

/// Ledger queries and updates. Shared by producers and workers, so every method takes `&self`.
pub trait Ledger: Send + Sync {
    /// Remote path recorded for a local path, if any.
    fn local_to_remote(&self, local_path: &str, kind: ItemKind) -> Result<Option<String>>;
    /// Local path recorded for a remote path, if any.
    fn remote_to_local(&self, remote_path: &str, kind: ItemKind) -> Result<Option<String>>;
    /// Stored file checksum, keyed by local path.
    fn checksum(&self, local_path: &str) -> Result<Option<Checksum>>;
    /// Stored remote modification time, keyed by remote path.
    fn remote_mtime(&self, remote_path: &str) -> Result<Option<i64>>;
    /// Every row, ordered by local path (parents before children).
    fn rows(&self) -> Result<Vec<LedgerRow>>;
    /// Insert or replace the row for `row.local_path`; any row holding the same remote path
    /// is replaced as well.
    fn record(&self, row: &LedgerRow) -> Result<()>;
    /// Drop the row for a local path. Missing rows are not an error.
    fn remove(&self, local_path: &str, kind: ItemKind) -> Result<()>;
    /// Remote change-log position stored after the last fully successful pass.
    fn changelog_token(&self) -> Result<Option<String>>;
    fn set_changelog_token(&self, token: &str) -> Result<()>;
}

/// WAL tuning pragmas. Use after `PRAGMA journal_mode = WAL`.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    local_path TEXT NOT NULL,
    remote_path TEXT NOT NULL,
    is_folder INTEGER NOT NULL,
    checksum BLOB,
    remote_mtime INTEGER,
    PRIMARY KEY (local_path, is_folder)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_items_remote ON items(remote_path, is_folder);

CREATE TABLE IF NOT EXISTS changelog (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    token TEXT NOT NULL
);
"#;

pub(crate) const RECORD_SQL: &str = "INSERT OR REPLACE INTO items \
     (local_path, remote_path, is_folder, checksum, remote_mtime) VALUES (?1, ?2, ?3, ?4, ?5)";
