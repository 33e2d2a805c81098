//! Progress reporting for multi-file operations.
//!
//! Workers run on a rayon pool, so the counter and the sink call happen under
//! one lock: observers always see `processed` strictly increase, whichever
//! thread delivers the callback.

use parking_lot::Mutex;
use std::path::Path;

/// Receives `(processed, total, current_item)` callbacks. Called from worker
/// threads, never concurrently.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, processed: usize, total: usize, current: &Path);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize, &Path) + Send + Sync,
{
    fn on_progress(&self, processed: usize, total: usize, current: &Path) {
        self(processed, total, current)
    }
}

/// Sink that discards every update.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _processed: usize, _total: usize, _current: &Path) {}
}

pub(crate) struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    total: usize,
    processed: Mutex<usize>,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, total: usize) -> Self {
        Self {
            sink,
            total,
            processed: Mutex::new(0),
        }
    }

    pub(crate) fn advance(&self, current: &Path) {
        let mut processed = self.processed.lock();
        *processed += 1;
        self.sink.on_progress(*processed, self.total, current);
    }
}
