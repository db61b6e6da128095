//! Trisync: three-way reconciliation of a local tree and a remote repository through a ledger

pub mod deps;
pub mod engine;
pub mod ledger;
pub mod local;
pub mod notify;
pub mod pipeline;
pub mod reconciler;
pub mod remote;
pub mod session;
pub mod triplet;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use ledger::{Ledger, SqliteLedger};
pub use remote::{DirRemote, RemoteRepository};
pub use session::SyncSession;

use log::debug;
use std::path::Path;
use std::sync::Arc;

/// Result alias used by public trisync API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: one full-crawl pass between `local_root` and the directory-backed
/// remote at `remote_dir`, using the SQLite ledger at `opts.ledger_path` (default: inside
/// `local_root`).
///
/// For other remotes or ledgers, build a [`SyncSession`] directly.
pub fn sync_dirs(local_root: &Path, remote_dir: &Path, opts: &SyncOpts) -> Result<SyncReport> {
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_string().to_uppercase(),
        opts
    );
    let ledger_path = opts.ledger_path.clone().unwrap_or_else(|| {
        local_root.join(utils::config::PackagePaths::get().ledger_filename())
    });
    let mut opts = opts.clone();
    opts.ledger_path = Some(ledger_path.clone());
    let ledger = Arc::new(SqliteLedger::open(&ledger_path)?);
    let remote = Arc::new(DirRemote::new(remote_dir)?);
    SyncSession::new(local_root, opts, ledger, remote)?.run_full_crawl_sync()
}
