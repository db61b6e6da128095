//! Sync session: wires producers, assembler, dispatcher and worker pool for one pass.

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, bounded};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use walkdir::WalkDir;

use crate::deps::Trackers;
use crate::engine::tools::{path_relative_to, path_to_db_string};
use crate::ledger::{Ledger, LedgerRow};
use crate::local::LocalTree;
use crate::notify::{LogNotifier, Notifier};
use crate::pipeline::{
    Assembler, AssemblySummary, ChangeLogOutcome, CrawlContext, Dispatcher,
    spawn_changelog_reader, spawn_ledger_scan, spawn_local_crawl,
};
use crate::reconciler::{ItemReport, Reconciler, WorkerPool};
use crate::remote::RemoteRepository;
use crate::triplet::{ItemKind, SyncItem, TripletFactory};
use crate::types::{FailedItem, ItemOutcome, SyncOpts, SyncReport};
use crate::utils::config::{PackagePaths, QUEUE_CAP};

#[derive(Clone, Copy)]
enum Assembly {
    FullCrawl,
    Resolved,
}

pub struct SyncSession {
    local_root: PathBuf,
    opts: SyncOpts,
    ledger: Arc<dyn Ledger>,
    remote: Arc<dyn RemoteRepository>,
    notifier: Arc<dyn Notifier>,
    cancel: Arc<AtomicBool>,
}

impl SyncSession {
    pub fn new(
        local_root: &Path,
        opts: SyncOpts,
        ledger: Arc<dyn Ledger>,
        remote: Arc<dyn RemoteRepository>,
    ) -> Result<Self> {
        let local_root = local_root
            .canonicalize()
            .with_context(|| format!("local root {}", local_root.display()))?;
        Ok(Self {
            local_root,
            opts,
            ledger,
            remote,
            notifier: Arc::new(LogNotifier),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Share an external cancel flag (e.g. set from a Ctrl+C handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Ask producers to stop. Items already queued still run.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Full crawl of both trees. Stores the remote change token when the pass fully succeeds.
    pub fn run_full_crawl_sync(&self) -> Result<SyncReport> {
        self.notifier.activity_started();
        let result = self.full_crawl();
        self.notifier.activity_stopped();
        result
    }

    /// Apply remote changes since the stored token. Returns false when the change log cannot
    /// be used and a full crawl is needed instead.
    pub fn run_incremental_change_sync(&self) -> Result<bool> {
        Ok(self.run_incremental_report()?.is_some())
    }

    /// Like [`run_incremental_change_sync`](Self::run_incremental_change_sync), returning the
    /// pass report, or None when a full crawl is needed.
    pub fn run_incremental_report(&self) -> Result<Option<SyncReport>> {
        self.notifier.activity_started();
        let result = self.incremental();
        self.notifier.activity_stopped();
        result
    }

    /// Incremental pass when `incremental` is set and the change log is usable, full crawl
    /// otherwise.
    pub fn run(&self, incremental: bool) -> Result<SyncReport> {
        if incremental {
            if let Some(report) = self.run_incremental_report()? {
                return Ok(report);
            }
            info!("falling back to a full crawl");
        }
        self.run_full_crawl_sync()
    }

    /// Propagate a local move from `old_rel` to `new_rel` (paths relative to the local root)
    /// without a full crawl. Folders move with their contents.
    pub fn sync_local_rename(&self, old_rel: &str, new_rel: &str) -> Result<SyncReport> {
        let local = LocalTree::new(&self.local_root);
        let kind = if local.exists(new_rel, ItemKind::Folder)? {
            ItemKind::Folder
        } else if local.exists(new_rel, ItemKind::File)? {
            ItemKind::File
        } else {
            return Err(anyhow!("{new_rel} does not exist locally"));
        };
        self.notifier.activity_started();
        let result = self.rename_pass(old_rel, new_rel, kind);
        self.notifier.activity_stopped();
        result
    }

    fn crawl_context(&self) -> CrawlContext {
        let ledger_canonical = self
            .opts
            .ledger_path
            .as_ref()
            .and_then(|p| p.canonicalize().ok());
        let mut exclude = self.opts.exclude.clone();
        exclude.extend(PackagePaths::get().reserved_patterns());
        CrawlContext::new(
            self.local_root.clone(),
            ledger_canonical,
            exclude,
            Arc::clone(&self.cancel),
        )
    }

    fn factory(&self) -> TripletFactory {
        TripletFactory::new(
            &self.local_root,
            &self.opts.remote_root,
            Arc::clone(&self.ledger),
        )
    }

    fn full_crawl(&self) -> Result<SyncReport> {
        let start_token = match self.remote.latest_change_token() {
            Ok(token) => Some(token),
            Err(e) => {
                debug!("no change token before crawl: {}", e);
                None
            }
        };
        let ctx = self.crawl_context();
        let factory = self.factory();
        let (tx, rx) = bounded(QUEUE_CAP);
        let crawl = spawn_local_crawl(tx.clone(), factory.clone(), ctx.clone());
        let scan = spawn_ledger_scan(tx, factory, Arc::clone(&self.ledger), ctx.clone());

        let mut report = self.assemble_and_reconcile(&ctx, rx, Assembly::FullCrawl);
        producer_result(&mut report, "local crawl", crawl);
        producer_result(&mut report, "deletion scan", scan);
        self.finish_report(&ctx, &mut report);

        if report.is_success()
            && let Some(token) = start_token
        {
            self.ledger.set_changelog_token(&token)?;
        }
        log_report("full crawl", &report);
        Ok(report)
    }

    fn incremental(&self) -> Result<Option<SyncReport>> {
        let ctx = self.crawl_context();
        let (tx, rx) = bounded(QUEUE_CAP);
        let reader = spawn_changelog_reader(
            tx,
            Arc::clone(&self.remote),
            Arc::clone(&self.ledger),
            self.factory(),
            ctx.clone(),
        );
        let mut report = self.assemble_and_reconcile(&ctx, rx, Assembly::Resolved);
        let outcome = reader
            .join()
            .map_err(|_| anyhow!("change log reader panicked"))??;
        self.finish_report(&ctx, &mut report);

        match outcome {
            ChangeLogOutcome::FullCrawlRequired => Ok(None),
            ChangeLogOutcome::UpToDate => Ok(Some(report)),
            ChangeLogOutcome::Processed { token, changes } => {
                if report.is_success() {
                    self.ledger.set_changelog_token(&token)?;
                }
                info!("change log: {} changes", changes);
                log_report("incremental", &report);
                Ok(Some(report))
            }
        }
    }

    fn rename_pass(&self, old_rel: &str, new_rel: &str, kind: ItemKind) -> Result<SyncReport> {
        let ctx = self.crawl_context();
        let factory = self.factory();
        let mut items = vec![factory.from_rename(old_rel, new_rel, kind)?];
        if kind == ItemKind::Folder {
            let new_abs = LocalTree::new(&self.local_root).abs(new_rel);
            for entry in WalkDir::new(&new_abs).min_depth(1).sort_by_file_name() {
                let entry = entry?;
                let Some(rel) = path_relative_to(entry.path(), &new_abs) else {
                    continue;
                };
                let suffix = path_to_db_string(&rel);
                if ctx.excludes(&format!("{new_rel}/{suffix}")) {
                    continue;
                }
                let child_kind = ItemKind::from_is_dir(entry.file_type().is_dir());
                items.push(factory.from_rename(
                    &format!("{old_rel}/{suffix}"),
                    &format!("{new_rel}/{suffix}"),
                    child_kind,
                )?);
            }
        }
        let mut report = self.run_items(&ctx, items);

        // Moved folders keep their old rows until the old remote folders are empty.
        if kind == ItemKind::Folder && report.is_success() {
            let prefix = format!("{old_rel}/");
            let leftovers: Vec<SyncItem> = self
                .ledger
                .rows()?
                .iter()
                .filter(|r| r.kind == ItemKind::Folder)
                .filter(|r| r.local_path == old_rel || r.local_path.starts_with(&prefix))
                .map(|r: &LedgerRow| factory.from_ledger_row(r))
                .collect();
            if !leftovers.is_empty() {
                let cleanup = self.run_items(&ctx, leftovers);
                report.merge(cleanup);
            }
        }
        self.finish_report(&ctx, &mut report);
        log_report("rename", &report);
        Ok(report)
    }

    /// Feed prepared semi-triplets through the resolving assembler and the pool.
    fn run_items(&self, ctx: &CrawlContext, items: Vec<SyncItem>) -> SyncReport {
        let (tx, rx) = bounded(QUEUE_CAP);
        let feeder = thread::spawn(move || {
            for item in items {
                if tx.send(item).is_err() {
                    break;
                }
            }
        });
        let report = self.assemble_and_reconcile(ctx, rx, Assembly::Resolved);
        let _ = feeder.join();
        report
    }

    fn assemble_and_reconcile(
        &self,
        ctx: &CrawlContext,
        input: Receiver<SyncItem>,
        mode: Assembly,
    ) -> SyncReport {
        let trackers = Arc::new(Trackers::new());
        let (work_tx, work_rx) = bounded(QUEUE_CAP);
        let dispatcher = Dispatcher::new(work_tx, Arc::clone(&trackers), self.opts.bidirectional);
        let assembler = Assembler::new(
            self.factory(),
            Arc::clone(&self.remote),
            ctx.clone(),
            self.opts.case_insensitive,
        );
        let assembly: JoinHandle<AssemblySummary> = thread::spawn(move || match mode {
            Assembly::FullCrawl => assembler.run(input, dispatcher),
            Assembly::Resolved => assembler.run_incremental(input, dispatcher),
        });

        let reconciler = Arc::new(Reconciler::new(
            LocalTree::new(&self.local_root),
            Arc::clone(&self.remote),
            Arc::clone(&self.ledger),
            &self.opts.remote_root,
        ));
        let pool = WorkerPool::new(self.opts.workers, trackers, Arc::clone(&self.notifier));
        let items = pool.run(work_rx, reconciler);

        let mut report = SyncReport::default();
        for ItemReport {
            name,
            outcome,
            error,
        } in items
        {
            report.record(&name, outcome);
            if outcome == ItemOutcome::Failed {
                report.failures.push(FailedItem {
                    name,
                    error: error.unwrap_or_default(),
                });
            }
        }
        match assembly.join() {
            Ok(summary) => {
                report.crawl_errors.extend(summary.crawl_error);
                report.crawl_errors.extend(summary.lookup_errors);
            }
            Err(_) => report.crawl_errors.push("assembler panicked".to_string()),
        }
        report
    }

    fn finish_report(&self, ctx: &CrawlContext, report: &mut SyncReport) {
        for (path, msg) in ctx.take_skipped() {
            report.crawl_errors.push(format!("{path}: {msg}"));
        }
        if ctx.is_cancelled() && !report.crawl_errors.iter().any(|e| e == "cancelled") {
            report.crawl_errors.push("cancelled".to_string());
        }
    }
}

fn producer_result(report: &mut SyncReport, what: &str, handle: JoinHandle<Result<usize>>) {
    match handle.join() {
        Ok(Ok(n)) => debug!("{}: {} items", what, n),
        Ok(Err(e)) => {
            warn!("{} failed: {:#}", what, e);
            report.crawl_errors.push(format!("{what}: {e:#}"));
        }
        Err(_) => report.crawl_errors.push(format!("{what} panicked")),
    }
}

fn log_report(what: &str, report: &SyncReport) {
    info!(
        "{}: {} synced, {} unchanged, {} conflicts, {} failed",
        what, report.succeeded, report.unchanged, report.conflicted, report.failed
    );
}
