//! Public and internal types for the trisync API and CLI.

use serde::Serialize;
use std::path::PathBuf;

use crate::utils::config::WorkerLimits;

/// Result of processing one triplet, reported to the dependency trackers and the notifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Already synchronized (or push disabled by policy); nothing was done.
    Unchanged,
    Succeeded,
    Failed,
    /// A conflict was resolved by renaming the local copy aside. Needs user attention.
    Conflicted,
}

/// One failed item in a [`SyncReport`].
#[derive(Clone, Debug, Serialize)]
pub struct FailedItem {
    pub name: String,
    pub error: String,
}

/// Aggregate result of one pass.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SyncReport {
    pub unchanged: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub conflicted: usize,
    /// Names of items resolved by rename-aside.
    pub conflicts: Vec<String>,
    pub failures: Vec<FailedItem>,
    /// Errors that kept part of the tree from being observed (e.g. a failed remote listing).
    pub crawl_errors: Vec<String>,
}

impl SyncReport {
    pub fn record(&mut self, name: &str, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Unchanged => self.unchanged += 1,
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Conflicted => {
                self.conflicted += 1;
                self.conflicts.push(name.to_string());
            }
        }
    }

    /// Fold a follow-up pass into this report.
    pub fn merge(&mut self, other: SyncReport) {
        self.unchanged += other.unchanged;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.conflicted += other.conflicted;
        self.conflicts.extend(other.conflicts);
        self.failures.extend(other.failures);
        self.crawl_errors.extend(other.crawl_errors);
    }

    pub fn processed(&self) -> usize {
        self.unchanged + self.succeeded + self.failed + self.conflicted
    }

    /// True only if every item succeeded (or needed nothing) and the whole tree was observed.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.conflicted == 0 && self.crawl_errors.is_empty()
    }
}

/// Lib-only options for [`SyncSession`](crate::session::SyncSession).
#[derive(Clone, Debug)]
pub struct SyncOpts {
    /// Remote folder (absolute, `/`-separated) mirrored by the local root.
    pub remote_root: String,
    /// Worker pool size. Default 4.
    pub workers: usize,
    /// Apply local changes to the remote. When false, push decisions are skipped.
    pub bidirectional: bool,
    /// Match local and remote names case-insensitively in the assembler.
    pub case_insensitive: bool,
    /// Exclude patterns (glob syntax, e.g. `*.log`, `node_modules`).
    pub exclude: Vec<String>,
    /// Ledger file, excluded from the local crawl when it lives under the local root.
    pub ledger_path: Option<PathBuf>,
}

impl Default for SyncOpts {
    fn default() -> Self {
        Self {
            remote_root: "/".to_string(),
            workers: WorkerLimits::DEFAULT_WORKERS,
            bidirectional: false,
            case_insensitive: false,
            exclude: Vec::new(),
            ledger_path: None,
        }
    }
}

impl From<&Opts> for SyncOpts {
    fn from(o: &Opts) -> Self {
        SyncOpts {
            remote_root: o.remote_root.clone(),
            workers: WorkerLimits::clamp(o.workers),
            bidirectional: o.bidirectional,
            case_insensitive: o.case_insensitive,
            exclude: o.exclude.clone(),
            ledger_path: Some(o.ledger_path()),
        }
    }
}

/// Full options (CLI and config file). Use [`SyncOpts`] for lib.
#[derive(Clone, Debug)]
pub struct Opts {
    /// Local root to synchronize.
    pub local_root: PathBuf,
    /// Directory backing the remote repository.
    pub remote_dir: PathBuf,
    /// Folder inside the remote repository mirrored by `local_root`.
    pub remote_root: String,
    /// Ledger path. When None, uses `local_root.join(<package ledger filename>)`.
    pub db_path: Option<PathBuf>,
    pub workers: usize,
    pub bidirectional: bool,
    pub case_insensitive: bool,
    pub exclude: Vec<String>,
    pub verbose: bool,
    /// Try the remote change log first; fall back to a full crawl when it is unusable.
    pub incremental: bool,
    /// Print the summary as JSON.
    pub json: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            local_root: PathBuf::from("."),
            remote_dir: PathBuf::new(),
            remote_root: "/".to_string(),
            db_path: None,
            workers: WorkerLimits::DEFAULT_WORKERS,
            bidirectional: false,
            case_insensitive: false,
            exclude: Vec::new(),
            verbose: false,
            incremental: false,
            json: false,
        }
    }
}

impl Opts {
    pub fn ledger_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            self.local_root
                .join(crate::utils::config::PackagePaths::get().ledger_filename())
        })
    }
}
