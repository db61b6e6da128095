//! Pipeline components: producers, assembler, dispatch.
//!
//! Producers (local crawl, ledger deletion scan, remote change log) emit semi-triplets on a
//! bounded channel. The assembler completes them against a concurrent remote crawl and hands
//! them to the dispatcher, which plans an action, registers dependencies and queues the item
//! for the worker pool.

pub mod assembler;
pub mod changelog;
pub mod dispatch;
pub mod ledger_scan;
pub mod local_crawl;

pub use assembler::{AssemblySummary, Assembler};
pub use changelog::{ChangeLogOutcome, read_changes, spawn_changelog_reader};
pub use dispatch::Dispatcher;
pub use ledger_scan::{scan_ledger_deletions, spawn_ledger_scan};
pub use local_crawl::{crawl_local, spawn_local_crawl};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::tools::should_include_in_walk;
use crate::local::LocalTree;
use crate::reconciler::Action;
use crate::triplet::SyncItem;

/// A complete triplet with its planned action, ready for a worker.
#[derive(Clone, Debug)]
pub struct Scheduled {
    pub item: SyncItem,
    pub action: Action,
}

/// Settings and shared state of the producers of one pass.
#[derive(Clone)]
pub struct CrawlContext {
    pub root: PathBuf,
    pub ledger_canonical: Option<PathBuf>,
    pub exclude: Vec<String>,
    pub cancel: Arc<AtomicBool>,
    /// Paths that could not be observed, with the reason.
    pub skipped: Arc<Mutex<Vec<(String, String)>>>,
}

impl CrawlContext {
    pub fn new(
        root: PathBuf,
        ledger_canonical: Option<PathBuf>,
        exclude: Vec<String>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            root,
            ledger_canonical,
            exclude,
            cancel,
            skipped: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// True if the relative path, or any folder above it, is skipped by the local crawl.
    pub fn excludes(&self, rel: &str) -> bool {
        let abs = LocalTree::new(&self.root).abs(rel);
        abs.ancestors()
            .take_while(|p| *p != self.root.as_path())
            .any(|p| !should_include_in_walk(p, &self.root, &self.ledger_canonical, &self.exclude))
    }

    pub fn skip(&self, path: String, msg: String) {
        log::warn!("skipped {}: {}", path, msg);
        self.skipped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((path, msg));
    }

    pub fn take_skipped(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.skipped.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
