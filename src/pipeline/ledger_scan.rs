//! Deletion scan producer: ledger rows whose local path is gone.

use anyhow::Result;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::CrawlContext;
use crate::ledger::Ledger;
use crate::local::LocalTree;
use crate::triplet::{SyncItem, TripletFactory};

pub fn spawn_ledger_scan(
    tx: Sender<SyncItem>,
    factory: TripletFactory,
    ledger: Arc<dyn Ledger>,
    ctx: CrawlContext,
) -> JoinHandle<Result<usize>> {
    thread::spawn(move || scan_ledger_deletions(&tx, &factory, ledger.as_ref(), &ctx))
}

/// Emit one semi-triplet (local absent, remote pending) per ledger row missing on disk, in
/// local-path order. Rows under excluded paths, and rows whose path cannot be examined, are
/// left alone.
pub fn scan_ledger_deletions(
    tx: &Sender<SyncItem>,
    factory: &TripletFactory,
    ledger: &dyn Ledger,
    ctx: &CrawlContext,
) -> Result<usize> {
    let local = LocalTree::new(&ctx.root);
    let mut sent = 0;
    for row in ledger.rows()? {
        if ctx.is_cancelled() {
            break;
        }
        match local.exists(&row.local_path, row.kind) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                ctx.skip(row.local_path.clone(), format!("{e:#}"));
                continue;
            }
        }
        if ctx.excludes(&row.local_path) {
            continue;
        }
        if tx.send(factory.from_ledger_row(&row)).is_err() {
            break;
        }
        sent += 1;
    }
    log::debug!("deletion scan: {} rows gone locally", sent);
    Ok(sent)
}

