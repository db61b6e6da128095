//! Dependency tracking between items processed concurrently.
//!
//! Two trackers run per pass: `items`, where a child waits for its parent folder to be created,
//! and `folders`, where a folder delete waits for every known descendant. A blocker that
//! resolves records its outcome; dependents of a failed or conflicted blocker inherit that
//! outcome instead of running.

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::types::ItemOutcome;

#[derive(Default)]
struct Graph {
    /// item -> names it waits on
    blockers: HashMap<String, HashSet<String>>,
    /// blocker -> items waiting on it
    dependents: HashMap<String, HashSet<String>>,
    failed: HashSet<String>,
    conflicted: HashSet<String>,
    /// Blockers already finished in this pass.
    resolved: HashMap<String, ItemOutcome>,
}

impl Graph {
    fn mark(&mut self, item: &str, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Failed => {
                self.failed.insert(item.to_string());
            }
            ItemOutcome::Conflicted => {
                self.conflicted.insert(item.to_string());
            }
            ItemOutcome::Unchanged | ItemOutcome::Succeeded => {}
        }
    }
}

pub struct DependencyTracker {
    label: &'static str,
    graph: Mutex<Graph>,
    changed: Condvar,
}

impl DependencyTracker {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            graph: Mutex::new(Graph::default()),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `item` wait on `blocker`. The root folder never blocks anything. A blocker that has
    /// already finished applies its outcome immediately.
    pub fn add_dependency(&self, item: &str, blocker: &str) {
        if blocker.trim_matches('/').is_empty() || item == blocker {
            return;
        }
        let mut g = self.lock();
        if let Some(outcome) = g.resolved.get(blocker).copied() {
            g.mark(item, outcome);
            return;
        }
        g.blockers
            .entry(item.to_string())
            .or_default()
            .insert(blocker.to_string());
        g.dependents
            .entry(blocker.to_string())
            .or_default()
            .insert(item.to_string());
    }

    /// `blocker` finished with `outcome`: release everything waiting on it.
    pub fn remove_dependency(&self, blocker: &str, outcome: ItemOutcome) {
        let mut g = self.lock();
        g.resolved.insert(blocker.to_string(), outcome);
        let Some(items) = g.dependents.remove(blocker) else {
            debug!("{}: nothing waits on {}", self.label, blocker);
            return;
        };
        for item in items {
            if let Some(set) = g.blockers.get_mut(&item) {
                set.remove(blocker);
                if set.is_empty() {
                    g.blockers.remove(&item);
                }
            }
            g.mark(&item, outcome);
        }
        drop(g);
        self.changed.notify_all();
    }

    pub fn dependency_count(&self, item: &str) -> usize {
        self.lock().blockers.get(item).map_or(0, HashSet::len)
    }

    pub fn is_resolved(&self, item: &str) -> bool {
        self.dependency_count(item) == 0
    }

    /// Block the calling thread until nothing `item` waits on is outstanding.
    pub fn wait_resolved(&self, item: &str) {
        let g = self.lock();
        let _g = self
            .changed
            .wait_while(g, |g| g.blockers.contains_key(item))
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Outcome inherited from a failed or conflicted blocker, if any. Clears the mark.
    pub fn take_blocked_result(&self, item: &str) -> Option<ItemOutcome> {
        let mut g = self.lock();
        let failed = g.failed.remove(item);
        let conflicted = g.conflicted.remove(item);
        if failed {
            Some(ItemOutcome::Failed)
        } else if conflicted {
            Some(ItemOutcome::Conflicted)
        } else {
            None
        }
    }
}

/// Both trackers of one pass.
pub struct Trackers {
    pub items: DependencyTracker,
    pub folders: DependencyTracker,
}

impl Default for Trackers {
    fn default() -> Self {
        Self::new()
    }
}

impl Trackers {
    pub fn new() -> Self {
        Self {
            items: DependencyTracker::new("items"),
            folders: DependencyTracker::new("folders"),
        }
    }

    /// Report an item's outcome to both trackers.
    pub fn finish(&self, name: &str, outcome: ItemOutcome) {
        self.items.remove_dependency(name, outcome);
        self.folders.remove_dependency(name, outcome);
    }
}
