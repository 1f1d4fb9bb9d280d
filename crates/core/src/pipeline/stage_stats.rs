use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-stage counters written by one worker thread and read by the control
/// thread.
///
/// `dropped` feeds the orchestrator's in-flight accounting: a frame dropped
/// upstream will never reach the display queue.
#[derive(Clone, Debug, Default)]
pub struct StageStats {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicUsize,
    dropped: AtomicUsize,
    failures: AtomicUsize,
}

impl StageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.inner.processed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_dropped(&self) {
        self.inner.dropped.fetch_add(1, Ordering::AcqRel);
    }

    /// A recoverable error that degraded, but did not drop, a frame.
    pub fn record_failure(&self) {
        self.inner.failures.fetch_add(1, Ordering::AcqRel);
    }

    pub fn processed(&self) -> usize {
        self.inner.processed.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> usize {
        self.inner.dropped.load(Ordering::Acquire)
    }

    pub fn failures(&self) -> usize {
        self.inner.failures.load(Ordering::Acquire)
    }
}
