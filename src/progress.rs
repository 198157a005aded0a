use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Progress sink for the bulk history fetch. Calls arrive from worker threads.
pub trait Progress: Sync {
    /// Called once with the number of players about to be fetched.
    fn begin(&self, _total: usize) {}

    /// Called when one player's fetch completes, successfully or not.
    fn item_done(&self, _element: i64, _ok: bool) {}

    fn finish(&self) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}

/// Logs a line every `every` completed players and at the end.
pub struct LogProgress {
    every: usize,
    total: AtomicUsize,
    done: AtomicUsize,
    failed: AtomicUsize,
}

impl LogProgress {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            total: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(50)
    }
}

impl Progress for LogProgress {
    fn begin(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        info!("Fetching history for {total} players");
    }

    fn item_done(&self, _element: i64, ok: bool) {
        if !ok {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.every == 0 {
            let total = self.total.load(Ordering::Relaxed);
            info!("history {done}/{total}");
        }
    }

    fn finish(&self) {
        info!(
            "History fetch finished: {}/{} players, {} failed",
            self.done(),
            self.total.load(Ordering::Relaxed),
            self.failed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_done_and_failed() {
        let progress = LogProgress::new(2);
        progress.begin(3);
        progress.item_done(1, true);
        progress.item_done(2, false);
        progress.item_done(3, true);
        progress.finish();
        assert_eq!(progress.done(), 3);
        assert_eq!(progress.failed(), 1);
    }
}
