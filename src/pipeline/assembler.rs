//! Assembler: turn semi-triplets into complete triplets and hand them to the dispatcher.
//!
//! During a full crawl the remote tree is listed on a separate thread into a concurrent map.
//! A local-origin item takes its remote side from the map when the crawl has already seen it,
//! from a point lookup when the ledger knows where it lives remotely, and otherwise waits for
//! the crawl to finish. Whatever is left in the map afterwards exists only remotely.

use crossbeam_channel::Receiver;
use dashmap::DashMap;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{CrawlContext, Dispatcher};
use crate::engine::tools::{join_remote, match_key, strip_remote_root};
use crate::remote::{RemoteError, RemoteRepository};
use crate::triplet::{ItemKind, RemoteState, Side, SyncItem, TripletFactory};

/// What the assembler did in one pass.
#[derive(Clone, Debug, Default)]
pub struct AssemblySummary {
    pub dispatched: usize,
    pub remote_only: usize,
    /// Point lookups that failed for a reason other than not-found.
    pub lookup_errors: Vec<String>,
    /// Set when the remote tree could not be listed completely.
    pub crawl_error: Option<String>,
}

pub struct Assembler {
    factory: TripletFactory,
    remote: Arc<dyn RemoteRepository>,
    ctx: CrawlContext,
    case_insensitive: bool,
}

type RemoteMap = DashMap<String, SyncItem>;

impl Assembler {
    pub fn new(
        factory: TripletFactory,
        remote: Arc<dyn RemoteRepository>,
        ctx: CrawlContext,
        case_insensitive: bool,
    ) -> Self {
        Self {
            factory,
            remote,
            ctx,
            case_insensitive,
        }
    }

    fn key(&self, name: &str) -> String {
        match_key(name, self.case_insensitive)
    }

    /// Full-crawl assembly. Consumes `input` until every producer is done, then emits
    /// held-back and remote-only items. Dropping the dispatcher on return closes the queue.
    pub fn run(&self, input: Receiver<SyncItem>, mut dispatcher: Dispatcher) -> AssemblySummary {
        let map: Arc<RemoteMap> = Arc::new(DashMap::new());
        let crawl = self.spawn_remote_crawl(Arc::clone(&map));
        let mut summary = AssemblySummary::default();
        let mut consumed: HashSet<String> = HashSet::new();
        let mut held_back: Vec<SyncItem> = Vec::new();

        for mut item in input.iter() {
            let key = self.key(&item.name);
            if !consumed.insert(key.clone()) {
                debug!("{} seen twice, keeping the first", item.name);
                continue;
            }
            if let Some((_, found)) = map.remove(&key) {
                item.resolve_remote(found.remote);
            } else if let Some(remote_rel) = item.ledger.as_ref().map(|l| l.remote_rel.clone()) {
                let remote = self.lookup(&remote_rel, item.kind, &mut summary);
                item.resolve_remote(remote);
            } else {
                held_back.push(item);
                continue;
            }
            if !self.emit(&mut dispatcher, item, &mut summary) {
                return summary;
            }
        }

        match crawl.join() {
            Ok(Ok(n)) => debug!("remote crawl: {} objects", n),
            Ok(Err(msg)) => summary.crawl_error = Some(msg),
            Err(_) => summary.crawl_error = Some("remote crawl panicked".to_string()),
        }
        if let Some(msg) = &summary.crawl_error {
            warn!(
                "remote crawl incomplete ({}); {} local-only items left for the next pass",
                msg,
                held_back.len()
            );
            return summary;
        }
        if self.ctx.is_cancelled() {
            return summary;
        }

        for mut item in held_back {
            let found = map.remove(&self.key(&item.name)).and_then(|(_, f)| f.remote);
            item.resolve_remote(found);
            if !self.emit(&mut dispatcher, item, &mut summary) {
                return summary;
            }
        }

        let keys: Vec<String> = map.iter().map(|e| e.key().clone()).collect();
        let mut remote_only: Vec<SyncItem> = keys
            .into_iter()
            .filter(|k| !consumed.contains(k))
            .filter_map(|k| map.remove(&k).map(|(_, item)| item))
            .collect();
        remote_only.sort_by(|a, b| a.name.cmp(&b.name));
        summary.remote_only = remote_only.len();
        for mut item in remote_only {
            if !self.attach_local(&mut item) {
                continue;
            }
            if !self.emit(&mut dispatcher, item, &mut summary) {
                return summary;
            }
        }
        summary
    }

    /// Incremental assembly: items come from the change log with the remote side known, so
    /// only the local side needs resolving.
    pub fn run_incremental(
        &self,
        input: Receiver<SyncItem>,
        mut dispatcher: Dispatcher,
    ) -> AssemblySummary {
        let mut summary = AssemblySummary::default();
        for mut item in input.iter() {
            if self.ctx.excludes(item.local_target()) {
                continue;
            }
            match item.pending_side() {
                Some(Side::Local) => {
                    if !self.attach_local(&mut item) {
                        continue;
                    }
                }
                Some(Side::Remote) => {
                    let remote_rel = item.remote_target().to_string();
                    let remote = self.lookup(&remote_rel, item.kind, &mut summary);
                    item.resolve_remote(remote);
                }
                None => {}
            }
            if !self.emit(&mut dispatcher, item, &mut summary) {
                break;
            }
        }
        summary
    }

    /// Look at the disk for the item's local side. An unreadable path keeps the item out of
    /// this pass, since its absence cannot be confirmed.
    fn attach_local(&self, item: &mut SyncItem) -> bool {
        match self.factory.attach_local_from_disk(item) {
            Ok(()) => true,
            Err(e) => {
                self.ctx.skip(item.local_target().to_string(), format!("{e:#}"));
                false
            }
        }
    }

    fn emit(
        &self,
        dispatcher: &mut Dispatcher,
        item: SyncItem,
        summary: &mut AssemblySummary,
    ) -> bool {
        debug_assert!(item.is_complete(), "{} handed over incomplete", item.name);
        summary.dispatched += 1;
        dispatcher.dispatch(item)
    }

    /// Point lookup of one remote path. Any failure leaves the remote side absent.
    fn lookup(
        &self,
        remote_rel: &str,
        kind: ItemKind,
        summary: &mut AssemblySummary,
    ) -> Option<RemoteState> {
        let path = join_remote(self.factory.remote_root(), remote_rel);
        match self.remote.get_object(&path) {
            Ok(object) if object.kind == kind => Some(RemoteState {
                root: self.factory.remote_root().to_string(),
                rel_path: remote_rel.to_string(),
                object,
            }),
            Ok(_) | Err(RemoteError::NotFound(_)) => None,
            Err(e) => {
                warn!("lookup of {} failed, treating as absent: {}", path, e);
                summary.lookup_errors.push(format!("{path}: {e}"));
                None
            }
        }
    }

    fn spawn_remote_crawl(&self, map: Arc<RemoteMap>) -> JoinHandle<Result<usize, String>> {
        let remote = Arc::clone(&self.remote);
        let factory = self.factory.clone();
        let ctx = self.ctx.clone();
        let case_insensitive = self.case_insensitive;
        thread::spawn(move || {
            crawl_remote(remote.as_ref(), &factory, &ctx, &map, case_insensitive)
        })
    }
}

/// List the remote tree below the factory's remote root into `map`, keyed by match key.
/// Iterative, so deep trees do not grow the stack.
fn crawl_remote(
    remote: &dyn RemoteRepository,
    factory: &TripletFactory,
    ctx: &CrawlContext,
    map: &RemoteMap,
    case_insensitive: bool,
) -> Result<usize, String> {
    let mut pending = vec![factory.remote_root().to_string()];
    let mut count = 0;
    while let Some(folder) = pending.pop() {
        if ctx.is_cancelled() {
            return Err("cancelled".to_string());
        }
        let children = remote
            .list_children(&folder)
            .map_err(|e| format!("list {folder}: {e}"))?;
        for object in children {
            let Some(rel) = strip_remote_root(factory.remote_root(), &object.path) else {
                continue;
            };
            if rel.is_empty() || ctx.excludes(&rel) {
                continue;
            }
            if object.kind == ItemKind::Folder {
                pending.push(object.path.clone());
            }
            let item = factory
                .from_remote_object(object)
                .map_err(|e| format!("{rel}: {e:#}"))?;
            map.insert(match_key(&item.name, case_insensitive), item);
            count += 1;
        }
    }
    Ok(count)
}
