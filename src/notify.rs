//! Activity and per-item notifications emitted during a pass.

use log::{debug, error, info};

use crate::types::ItemOutcome;

pub trait Notifier: Send + Sync {
    fn activity_started(&self) {}
    fn activity_stopped(&self) {}
    fn error(&self, name: &str, err: &anyhow::Error);
    fn item_finished(&self, _name: &str, _outcome: ItemOutcome) {}
}

/// Notifier that writes to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn activity_started(&self) {
        debug!("sync started");
    }

    fn activity_stopped(&self) {
        debug!("sync stopped");
    }

    fn error(&self, name: &str, err: &anyhow::Error) {
        error!("{}: {:#}", name, err);
    }

    fn item_finished(&self, name: &str, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Unchanged => {}
            ItemOutcome::Succeeded => debug!("synced {}", name),
            ItemOutcome::Conflicted => info!("conflict on {}", name),
            ItemOutcome::Failed => debug!("failed {}", name),
        }
    }
}
