//! Change-log producer: emit one semi-triplet per remote path changed since the stored token.

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::CrawlContext;
use crate::engine::tools::strip_remote_root;
use crate::ledger::Ledger;
use crate::remote::{ChangeKind, RemoteChange, RemoteError, RemoteRepository};
use crate::triplet::{SyncItem, TripletFactory};
use crate::utils::config::CHANGE_PAGE_SIZE;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeLogOutcome {
    /// Stored token equals the server's: nothing to do.
    UpToDate,
    /// Changes were emitted; `token` is the position to store once they are all applied.
    Processed { token: String, changes: usize },
    /// No usable token; the caller must fall back to a full crawl.
    FullCrawlRequired,
}

pub fn spawn_changelog_reader(
    tx: Sender<SyncItem>,
    remote: Arc<dyn RemoteRepository>,
    ledger: Arc<dyn Ledger>,
    factory: TripletFactory,
    ctx: CrawlContext,
) -> JoinHandle<Result<ChangeLogOutcome>> {
    thread::spawn(move || read_changes(&tx, remote.as_ref(), ledger.as_ref(), &factory, &ctx))
}

/// Read every page after the stored token, keep the last change per path, and emit them in
/// path order. Nothing is emitted unless the whole log could be read.
pub fn read_changes(
    tx: &Sender<SyncItem>,
    remote: &dyn RemoteRepository,
    ledger: &dyn Ledger,
    factory: &TripletFactory,
    ctx: &CrawlContext,
) -> Result<ChangeLogOutcome> {
    let Some(stored) = ledger.changelog_token()? else {
        info!("no change token stored yet, full crawl needed");
        return Ok(ChangeLogOutcome::FullCrawlRequired);
    };
    let latest = remote
        .latest_change_token()
        .context("read latest change token")?;
    if stored == latest {
        debug!("change log: up to date");
        return Ok(ChangeLogOutcome::UpToDate);
    }

    let mut latest_by_path: BTreeMap<String, RemoteChange> = BTreeMap::new();
    let mut token = stored;
    loop {
        if ctx.is_cancelled() {
            return Ok(ChangeLogOutcome::FullCrawlRequired);
        }
        let page = match remote.changes_since(&token, CHANGE_PAGE_SIZE) {
            Ok(page) => page,
            Err(RemoteError::TokenUnknown) => {
                info!("change token no longer known to the remote, full crawl needed");
                return Ok(ChangeLogOutcome::FullCrawlRequired);
            }
            Err(e) => return Err(e).context("read change log"),
        };
        for change in page.changes {
            latest_by_path.insert(change.path.clone(), change);
        }
        token = page.next_token;
        if !page.has_more {
            break;
        }
    }

    let mut sent = 0;
    for change in latest_by_path.into_values() {
        let Some(rel) = strip_remote_root(factory.remote_root(), &change.path) else {
            continue;
        };
        if rel.is_empty() {
            continue;
        }
        let object = match (change.kind, change.object) {
            (ChangeKind::Deleted, _) => None,
            (_, Some(object)) => Some(object),
            (_, None) => match remote.get_object(&change.path) {
                Ok(object) => Some(object),
                Err(RemoteError::NotFound(_)) => None,
                Err(e) => return Err(e).with_context(|| format!("look up {}", change.path)),
            },
        };
        let item = match object {
            Some(object) => factory.from_remote_object(object)?,
            None => factory.from_remote_deletion(&rel, change.item_kind)?,
        };
        if tx.send(item).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(ChangeLogOutcome::Processed {
        token,
        changes: sent,
    })
}
