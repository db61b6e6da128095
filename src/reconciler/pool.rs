//! Worker pool: N threads drain the scheduled queue, each item owned by exactly one worker.
//!
//! Folder deletes are parked when received. Once the queue is closed and every worker has
//! drained it, parked deletes run deepest first so a folder goes after its contents.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Barrier, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::deps::Trackers;
use crate::engine::tools::depth;
use crate::notify::Notifier;
use crate::pipeline::Scheduled;
use crate::types::ItemOutcome;

/// Executes the side effects for one scheduled item.
pub trait ItemProcessor: Send + Sync {
    fn process(&self, scheduled: &Scheduled) -> Result<ItemOutcome>;
}

/// Outcome of one item, as collected by the pool.
#[derive(Clone, Debug)]
pub struct ItemReport {
    pub name: String,
    pub outcome: ItemOutcome,
    pub error: Option<String>,
}

pub struct WorkerPool {
    workers: usize,
    trackers: Arc<Trackers>,
    notifier: Arc<dyn Notifier>,
}

struct Shared {
    processor: Arc<dyn ItemProcessor>,
    trackers: Arc<Trackers>,
    notifier: Arc<dyn Notifier>,
    parked: Mutex<Vec<Scheduled>>,
    barrier: Barrier,
    results: Sender<ItemReport>,
}

impl WorkerPool {
    pub fn new(workers: usize, trackers: Arc<Trackers>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            workers: workers.max(1),
            trackers,
            notifier,
        }
    }

    /// Process everything received on `rx` until the sender side is dropped. Blocks until all
    /// workers have exited.
    pub fn run(
        &self,
        rx: Receiver<Scheduled>,
        processor: Arc<dyn ItemProcessor>,
    ) -> Vec<ItemReport> {
        let (results_tx, results_rx) = unbounded();
        let shared = Arc::new(Shared {
            processor,
            trackers: Arc::clone(&self.trackers),
            notifier: Arc::clone(&self.notifier),
            parked: Mutex::new(Vec::new()),
            barrier: Barrier::new(self.workers),
            results: results_tx,
        });

        let handles: Vec<JoinHandle<()>> = (0..self.workers)
            .map(|i| {
                let rx = rx.clone();
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(i, rx, shared))
            })
            .collect();
        drop(rx);

        for h in handles {
            if h.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        drop(shared);
        results_rx.iter().collect()
    }
}

fn worker_loop(id: usize, rx: Receiver<Scheduled>, shared: Arc<Shared>) {
    while let Ok(mut scheduled) = rx.recv() {
        if scheduled.action.is_folder_delete(scheduled.item.kind) {
            scheduled.item.delayed = true;
            shared
                .parked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(scheduled);
            continue;
        }
        shared.run_one(scheduled);
    }
    debug!("worker {}: queue drained", id);
    shared.barrier.wait();

    while let Some(scheduled) = shared.next_parked() {
        shared.run_one(scheduled);
    }
}

impl Shared {
    /// Deepest parked folder delete, if any.
    fn next_parked(&self) -> Option<Scheduled> {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = parked
            .iter()
            .enumerate()
            .max_by_key(|(_, s)| depth(&s.item.name))
            .map(|(i, _)| i)?;
        Some(parked.swap_remove(idx))
    }

    fn run_one(&self, scheduled: Scheduled) {
        let name = scheduled.item.name.clone();
        let (outcome, error) = match self.blocked_outcome(&scheduled) {
            Some(outcome) => (outcome, Some("blocked by an unsuccessful dependency".to_string())),
            None => self.execute(&scheduled),
        };
        self.trackers.finish(&name, outcome);
        self.notifier.item_finished(&name, outcome);
        let _ = self.results.send(ItemReport {
            name,
            outcome,
            error,
        });
    }

    /// Wait for the item's blockers; returns the inherited outcome if one of them failed.
    fn blocked_outcome(&self, scheduled: &Scheduled) -> Option<ItemOutcome> {
        let name = &scheduled.item.name;
        self.trackers.items.wait_resolved(name);
        if let Some(outcome) = self.trackers.items.take_blocked_result(name) {
            debug!("{}: parent did not sync, skipping", name);
            return Some(outcome);
        }
        if scheduled.item.delayed {
            self.trackers.folders.wait_resolved(name);
            if let Some(outcome) = self.trackers.folders.take_blocked_result(name) {
                debug!("{}: contents did not sync, keeping folder", name);
                return Some(outcome);
            }
        }
        None
    }

    fn execute(&self, scheduled: &Scheduled) -> (ItemOutcome, Option<String>) {
        let name = &scheduled.item.name;
        match catch_unwind(AssertUnwindSafe(|| self.processor.process(scheduled))) {
            Ok(Ok(outcome)) => (outcome, None),
            Ok(Err(e)) => {
                self.notifier.error(name, &e);
                (ItemOutcome::Failed, Some(format!("{e:#}")))
            }
            Err(_) => {
                let e = anyhow::anyhow!("panicked while processing");
                self.notifier.error(name, &e);
                (ItemOutcome::Failed, Some(e.to_string()))
            }
        }
    }
}
