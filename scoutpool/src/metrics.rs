use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info};

/// Counters describing what a thread pool has done since its last abort.
///
/// With no concurrent activity the following holds:
/// `queued + running == enqueued - completed`.
#[derive(Debug, Default)]
pub struct PoolStats {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    completed: AtomicU64,
    running: AtomicUsize,

    // Lifetime counters, never reset
    panicked: AtomicU64,
    discarded: AtomicU64,
    aborts: AtomicU64,
    backpressure_waits: AtomicU64,
}

impl PoolStats {
    /// Creates a new PoolStats instance
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_enqueue(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeue(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        self.running.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.running.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backpressure(&self) {
        let waits = self.backpressure_waits.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Producer throttled by backpressure ({} waits so far)", waits);
    }

    /// Starts a new abort generation, dropping `discarded` never-run tasks.
    pub(crate) fn record_abort(&self, discarded: usize) {
        self.discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        self.aborts.fetch_add(1, Ordering::Relaxed);
        self.enqueued.store(0, Ordering::Relaxed);
        self.dequeued.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
    }

    /// Final teardown: counts what was dropped but is not an abort.
    pub(crate) fn record_shutdown(&self, discarded: usize) {
        self.discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
    }

    /// Number of tasks currently inside `run`
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Gets a point-in-time copy of every counter
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            running: self.running(),
            panicked: self.panicked.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
        }
    }

    /// Logs current statistics
    pub fn log_stats(&self) {
        let stats = self.snapshot();
        info!(
            "Pool stats: {} enqueued, {} completed, {} running, {} panicked, {} discarded over {} aborts",
            stats.enqueued,
            stats.completed,
            stats.running,
            stats.panicked,
            stats.discarded,
            stats.aborts
        );
        debug!(
            "Dispatch: {} dequeued, {} backpressure waits",
            stats.dequeued, stats.backpressure_waits
        );
    }
}

/// Plain copy of [`PoolStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub enqueued: u64,
    pub dequeued: u64,
    pub completed: u64,
    pub running: usize,
    pub panicked: u64,
    pub discarded: u64,
    pub aborts: u64,
    pub backpressure_waits: u64,
}

impl PoolStatsSnapshot {
    /// Tasks accepted since the last abort that have not finished yet
    pub fn outstanding(&self) -> u64 {
        self.enqueued.saturating_sub(self.completed)
    }
}
