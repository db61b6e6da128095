//! Progress display for the CLI: a kdam counter advanced as items finish.

use kdam::{Animation, Bar, BarExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::notify::{LogNotifier, Notifier};
use crate::types::ItemOutcome;

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a counter for unknown total (shows count without percentage)
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " items"
    )))
}

/// Force a refresh of the bar (e.g. so counter shows "0 items" immediately).
pub fn refresh_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.refresh();
    }
}

/// Move the bar to an absolute count. Uses try_lock so workers never block on the display;
/// a skipped update is covered by the next one.
pub fn set_bar_position(pb: &ProgressBar, n: usize) {
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update_to(n);
    }
}

/// Notifier that logs like [`LogNotifier`] and counts finished items on a progress bar.
pub struct ProgressNotifier {
    log: LogNotifier,
    bar: ProgressBar,
    finished: AtomicUsize,
}

impl ProgressNotifier {
    pub fn new(desc: &'static str) -> Self {
        Self {
            log: LogNotifier,
            bar: create_counter(desc),
            finished: AtomicUsize::new(0),
        }
    }
}

impl Notifier for ProgressNotifier {
    fn activity_started(&self) {
        refresh_bar(&self.bar);
        self.log.activity_started();
    }

    fn activity_stopped(&self) {
        if let Ok(mut bar) = self.bar.lock() {
            let _ = bar.update_to(self.finished.load(Ordering::Relaxed));
            eprintln!();
        }
        self.log.activity_stopped();
    }

    fn error(&self, name: &str, err: &anyhow::Error) {
        self.log.error(name, err);
    }

    fn item_finished(&self, name: &str, outcome: ItemOutcome) {
        let n = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        set_bar_position(&self.bar, n);
        self.log.item_finished(name, outcome);
    }
}
