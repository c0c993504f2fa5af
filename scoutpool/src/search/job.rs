use ignore::WalkBuilder;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::subtask::{FileScan, FileSearchSubtask};
use super::{SearchLimits, SearchOptions};
use crate::aggregator::Aggregator;
use crate::errors::ScoutResult;
use crate::pool::PoolHandle;
use crate::results::{FailureRecord, FAILURE_OVERFLOW, RESULT_OVERFLOW};
use crate::task::{Task, TaskControl};

/// Recursive substring search that fans out one subtask per file.
///
/// The job itself only discovers files. It is shared through an `Arc` with
/// every subtask it spawns, so its buffers stay valid for as long as any of
/// them is still running, even after the creator has dropped its handle.
pub struct SearchJob {
    control: TaskControl,
    root: PathBuf,
    substring: String,
    pool: PoolHandle,
    limits: SearchLimits,
    options: SearchOptions,

    // Bumped by every prepare. Completions hold the read side so a restart
    // cannot interleave with a flush from the previous run.
    epoch: RwLock<u64>,
    discovered: AtomicUsize,
    completed: AtomicUsize,
    found_all: AtomicBool,
    critical: AtomicUsize,

    results: Aggregator<String>,
    failures: Aggregator<String>,
}

impl SearchJob {
    /// Creates a job with default limits and no path filters.
    pub fn new(root: impl Into<PathBuf>, substring: impl Into<String>, pool: PoolHandle) -> Arc<Self> {
        Self::with_settings(
            root,
            substring,
            pool,
            SearchLimits::default(),
            SearchOptions::default(),
        )
    }

    pub fn with_settings(
        root: impl Into<PathBuf>,
        substring: impl Into<String>,
        pool: PoolHandle,
        limits: SearchLimits,
        options: SearchOptions,
    ) -> Arc<Self> {
        let results = Aggregator::new(limits.result_capacity, RESULT_OVERFLOW.to_string());
        let failures = Aggregator::new(limits.failure_capacity, FAILURE_OVERFLOW.to_string());
        Arc::new(Self {
            control: TaskControl::new(),
            root: root.into(),
            substring: substring.into(),
            pool,
            limits,
            options,
            epoch: RwLock::new(0),
            discovered: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            found_all: AtomicBool::new(false),
            critical: AtomicUsize::new(0),
            results,
            failures,
        })
    }

    pub fn search_path(&self) -> &Path {
        &self.root
    }

    pub fn substring(&self) -> &str {
        &self.substring
    }

    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }

    /// Files discovered and submitted so far
    pub fn total_files(&self) -> usize {
        self.discovered.load(Ordering::Acquire)
    }

    /// Files whose subtask has finished (including cancelled ones)
    pub fn completed_files(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// True once discovery ran to the end without being cancelled
    pub fn found_all(&self) -> bool {
        self.found_all.load(Ordering::Acquire)
    }

    pub fn finished(&self) -> bool {
        self.found_all() && self.completed_files() == self.total_files()
    }

    pub fn get_result(&self) -> Vec<String> {
        self.results.snapshot()
    }

    pub fn get_result_prefix(&self, count: usize) -> Vec<String> {
        self.results.prefix(count)
    }

    pub fn clear_result(&self) {
        self.results.clear();
    }

    /// Removes and returns up to `count` leading results
    pub fn drain_result(&self, count: usize) -> Vec<String> {
        self.results.drain(count)
    }

    pub fn get_failure_logs(&self) -> Vec<String> {
        self.failures.snapshot()
    }

    pub fn get_failure_logs_prefix(&self, count: usize) -> Vec<String> {
        self.failures.prefix(count)
    }

    pub fn clear_failure_logs(&self) {
        self.failures.clear();
    }

    pub fn drain_failure_logs(&self, count: usize) -> Vec<String> {
        self.failures.drain(count)
    }

    /// Failures that could not even be recorded
    pub fn critical_errors(&self) -> usize {
        self.critical.load(Ordering::Acquire)
    }

    pub fn reset_critical(&self) {
        self.critical.store(0, Ordering::Release);
    }

    pub(crate) fn epoch(&self) -> u64 {
        *self.epoch.read()
    }

    pub(crate) fn record_critical(&self, count: usize) {
        if count > 0 {
            self.critical.fetch_add(count, Ordering::AcqRel);
        }
    }

    pub(crate) fn record_failure(&self, path: &Path, message: impl std::fmt::Display) {
        let entry = FailureRecord::new(path, message).to_string();
        if self.failures.push(entry).is_err() {
            self.record_critical(1);
        }
    }

    /// Accepts the outcome of one subtask: flushes its buffers unless the job
    /// was cancelled, then counts the file as completed.
    ///
    /// Scans from an earlier run of this job are dropped without a trace.
    /// The whole hand-over runs under the epoch read lock, so a concurrent
    /// `prepare` either waits for it or makes it stale.
    pub(crate) fn complete_file(&self, epoch: u64, scan: FileScan) {
        let current = self.epoch.read();
        if epoch != *current {
            trace!("Dropping stale scan of {}", scan.path().display());
            return;
        }

        self.record_critical(scan.critical());
        if !self.is_cancelled() {
            if !self.flush(scan.results(), &self.results) {
                self.record_failure(scan.path(), "failed to push results");
            }
            if !self.flush(scan.failures(), &self.failures) {
                self.record_critical(1);
            }
        }
        self.completed.fetch_add(1, Ordering::AcqRel);
        drop(current);
    }

    /// Appends `entries` batch by batch; false when memory ran out.
    fn flush(&self, entries: &[String], into: &Aggregator<String>) -> bool {
        let batch_size = self.limits.flush_batch_size.max(1);
        for batch in entries.chunks(batch_size) {
            if self.is_cancelled() {
                return true;
            }
            if into.append_batch(batch).is_err() {
                return false;
            }
        }
        true
    }

    fn discover(self: &Arc<Self>, epoch: u64) -> ScoutResult<()> {
        if !self.root.is_dir() {
            self.submit(self.root.clone(), epoch)?;
            return Ok(());
        }

        let filter = self.options.compile();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .build();

        for entry in walker {
            if self.is_cancelled() {
                debug!(
                    "Discovery cancelled after {} files",
                    self.total_files()
                );
                return Ok(());
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Walk error under {}: {}", self.root.display(), err);
                    self.record_failure(&self.root, format!("failed to read directory: {}", err));
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.into_path();
            if !filter.includes(&path) {
                trace!("Skipping filtered file {}", path.display());
                continue;
            }
            if !self.submit(path, epoch)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Submits one subtask, waiting for queue space first. Returns false if
    /// the job was cancelled while waiting.
    fn submit(self: &Arc<Self>, path: PathBuf, epoch: u64) -> ScoutResult<bool> {
        let has_room = self
            .pool
            .wait_for_capacity(self.limits.queue_threshold, || self.is_cancelled())?;
        if !has_room || self.is_cancelled() {
            return Ok(false);
        }

        let subtask = Arc::new(FileSearchSubtask::new(path, Arc::clone(self), epoch));
        // Count first so completed_files() can never overtake total_files().
        self.discovered.fetch_add(1, Ordering::AcqRel);
        if let Err(err) = self.pool.enqueue(subtask) {
            self.discovered.fetch_sub(1, Ordering::AcqRel);
            return Err(err);
        }
        Ok(true)
    }
}

impl Task for SearchJob {
    fn control(&self) -> &TaskControl {
        &self.control
    }

    fn prepare(&self) {
        let mut epoch = self.epoch.write();
        *epoch += 1;
        self.discovered.store(0, Ordering::Release);
        self.completed.store(0, Ordering::Release);
        self.found_all.store(false, Ordering::Release);
        self.critical.store(0, Ordering::Release);
        self.results.clear();
        self.failures.clear();
        drop(epoch);
    }

    fn run(self: Arc<Self>) {
        let epoch = self.epoch();
        info!(
            "Starting search for {:?} in {}",
            self.substring,
            self.root.display()
        );

        let job = Arc::clone(&self);
        match panic::catch_unwind(AssertUnwindSafe(move || job.discover(epoch))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("Discovery stopped early: {}", err);
                self.record_failure(&self.root, err);
            }
            Err(_) => {
                warn!("Discovery panicked under {}", self.root.display());
                self.record_failure(&self.root, "an unknown error occurred");
            }
        }

        if self.is_cancelled() {
            info!(
                "Search cancelled after discovering {} files",
                self.total_files()
            );
            return;
        }
        self.found_all.store(true, Ordering::Release);
        info!(
            "Discovery complete: {} files submitted",
            self.total_files()
        );
    }

    fn describe(&self) -> String {
        format!("search({:?} in {})", self.substring, self.root.display())
    }
}

impl std::fmt::Debug for SearchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchJob")
            .field("root", &self.root)
            .field("substring", &self.substring)
            .field("total_files", &self.total_files())
            .field("completed_files", &self.completed_files())
            .field("found_all", &self.found_all())
            .finish()
    }
}
