//! Local crawl producer: walk the local root, build semi-triplets, emit changed items first.

use anyhow::Result;
use crossbeam_channel::Sender;
use log::debug;
use rayon::prelude::*;
use std::thread::{self, JoinHandle};
use walkdir::WalkDir;

use super::CrawlContext;
use crate::engine::tools::{path_relative_to, path_to_db_string, should_include_in_walk};
use crate::triplet::{ItemKind, SyncItem, TripletFactory};

pub fn spawn_local_crawl(
    tx: Sender<SyncItem>,
    factory: TripletFactory,
    ctx: CrawlContext,
) -> JoinHandle<Result<usize>> {
    thread::spawn(move || crawl_local(&tx, &factory, &ctx))
}

/// Walk the tree in path order (parents before children), checksum files in parallel, then send
/// items that differ from the ledger before items that do not. Returns the number sent.
pub fn crawl_local(
    tx: &Sender<SyncItem>,
    factory: &TripletFactory,
    ctx: &CrawlContext,
) -> Result<usize> {
    let mut items = Vec::new();
    let walker = WalkDir::new(&ctx.root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || should_include_in_walk(e.path(), &ctx.root, &ctx.ledger_canonical, &ctx.exclude)
        });

    for entry in walker {
        if ctx.is_cancelled() {
            return Ok(0);
        }
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                ctx.skip(path, err.to_string());
                continue;
            }
        };
        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            ItemKind::Folder
        } else if file_type.is_file() {
            ItemKind::File
        } else {
            debug!("not a file or folder, ignored: {}", entry.path().display());
            continue;
        };
        let Some(rel) = path_relative_to(entry.path(), &ctx.root) else {
            continue;
        };
        items.push(factory.from_local_path(&path_to_db_string(&rel), kind)?);
    }

    // Warm the lazy checksums in parallel before the ledger comparison.
    items.par_iter().for_each(|item| {
        if let Some(local) = &item.local {
            let _ = local.checksum();
        }
    });
    let (changed, unchanged): (Vec<SyncItem>, Vec<SyncItem>) =
        items.into_iter().partition(|i| !i.local_matches_ledger());
    debug!(
        "local crawl: {} changed, {} unchanged",
        changed.len(),
        unchanged.len()
    );

    let mut sent = 0;
    for item in changed.into_iter().chain(unchanged) {
        if ctx.is_cancelled() || tx.send(item).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
