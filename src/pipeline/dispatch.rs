//! Dispatch: plan each complete triplet, register its dependencies, queue it for the pool.
//!
//! Dependencies only point at items dispatched earlier, so a worker never waits on something
//! still sitting behind it in the queue.

use crossbeam_channel::Sender;
use log::debug;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::Scheduled;
use crate::deps::Trackers;
use crate::engine::tools::parent_name;
use crate::reconciler::Action;
use crate::triplet::SyncItem;

pub struct Dispatcher {
    tx: Sender<Scheduled>,
    trackers: Arc<Trackers>,
    bidirectional: bool,
    /// Every name dispatched so far, ordered for prefix scans.
    emitted: BTreeSet<String>,
    folder_creates: HashSet<String>,
    folder_deletes: HashSet<String>,
}

impl Dispatcher {
    pub fn new(tx: Sender<Scheduled>, trackers: Arc<Trackers>, bidirectional: bool) -> Self {
        Self {
            tx,
            trackers,
            bidirectional,
            emitted: BTreeSet::new(),
            folder_creates: HashSet::new(),
            folder_deletes: HashSet::new(),
        }
    }

    pub fn dispatched(&self) -> usize {
        self.emitted.len()
    }

    pub fn is_dispatched(&self, name: &str) -> bool {
        self.emitted.contains(name)
    }

    /// Queue one complete triplet. Returns false once the pool has gone away.
    pub fn dispatch(&mut self, item: SyncItem) -> bool {
        if self.emitted.contains(&item.name) {
            debug!("{} already dispatched this pass", item.name);
            return true;
        }
        let action = Action::plan(&item, self.bidirectional);
        let name = item.name.clone();
        let kind = item.kind;

        if action.needs_parent()
            && let Some(parent) = parent_name(&name)
            && self.folder_creates.contains(&parent)
        {
            self.trackers.items.add_dependency(&name, &parent);
        }

        if action.is_folder_delete(kind) {
            let descendants: Vec<String> = self
                .emitted
                .range(name.clone()..)
                .take_while(|e| e.starts_with(&name))
                .cloned()
                .collect();
            for child in descendants {
                self.trackers.folders.add_dependency(&name, &child);
            }
            self.folder_deletes.insert(name.clone());
        }

        let mut ancestor = parent_name(&name);
        while let Some(a) = ancestor {
            if self.folder_deletes.contains(&a) {
                self.trackers.folders.add_dependency(&a, &name);
            }
            ancestor = parent_name(&a);
        }

        if action.creates_folder(kind) {
            self.folder_creates.insert(name.clone());
        }
        self.emitted.insert(name);
        self.tx.send(Scheduled { item, action }).is_ok()
    }
}
