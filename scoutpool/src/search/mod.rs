//! Fan-out file content search built on the task pool.
//!
//! A [`SearchJob`] walks its root and submits one [`FileSearchSubtask`] per
//! file back into the same pool. Subtasks scan their file for a literal
//! substring, keep matches and failures in local buffers and flush them into
//! the job's two aggregators in batches. A consumer polls the job for
//! progress and drains the aggregators whenever it likes.

pub mod job;
pub mod snippet;
pub mod subtask;

pub use job::SearchJob;
pub use subtask::FileSearchSubtask;

use glob::Pattern;
use std::path::Path;

use crate::filters::{compile_patterns, has_valid_extension, is_likely_binary, should_ignore};

pub const DEFAULT_QUEUE_THRESHOLD: usize = 10_000;
pub const DEFAULT_FLUSH_BATCH_SIZE: usize = 64;
pub const DEFAULT_SNIPPET_WIDTH: usize = 80;
pub const DEFAULT_MAX_RESULTS_PER_FILE: usize = 256;
pub const DEFAULT_MAX_FAILURES_PER_FILE: usize = 20;
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;
pub const DEFAULT_RESULT_CAPACITY: usize = 100_000;
pub const DEFAULT_FAILURE_CAPACITY: usize = 10_000;

/// Memory and throughput bounds for one search job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLimits {
    /// Producer blocks while at least this many tasks are queued
    pub queue_threshold: usize,
    /// Entries appended per aggregator lock acquisition
    pub flush_batch_size: usize,
    /// Maximum snippet length in characters
    pub snippet_width: usize,
    pub max_results_per_file: usize,
    pub max_failures_per_file: usize,
    /// Lines longer than this are reported and skipped
    pub max_line_bytes: usize,
    /// Soft capacity of the job's result buffer
    pub result_capacity: usize,
    /// Soft capacity of the job's failure buffer
    pub failure_capacity: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            queue_threshold: DEFAULT_QUEUE_THRESHOLD,
            flush_batch_size: DEFAULT_FLUSH_BATCH_SIZE,
            snippet_width: DEFAULT_SNIPPET_WIDTH,
            max_results_per_file: DEFAULT_MAX_RESULTS_PER_FILE,
            max_failures_per_file: DEFAULT_MAX_FAILURES_PER_FILE,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            failure_capacity: DEFAULT_FAILURE_CAPACITY,
        }
    }
}

/// Which discovered files a job submits.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Only search files with one of these extensions
    pub file_extensions: Option<Vec<String>>,
    /// Glob patterns of paths to skip
    pub ignore_patterns: Vec<String>,
    /// Skip files whose extension marks them as binary
    pub skip_binary: bool,
}

impl SearchOptions {
    pub(crate) fn compile(&self) -> PathFilter {
        PathFilter {
            file_extensions: self.file_extensions.clone(),
            ignore: compile_patterns(&self.ignore_patterns),
            skip_binary: self.skip_binary,
        }
    }
}

/// [`SearchOptions`] with its globs compiled once per run.
pub(crate) struct PathFilter {
    file_extensions: Option<Vec<String>>,
    ignore: Vec<Pattern>,
    skip_binary: bool,
}

impl PathFilter {
    pub(crate) fn includes(&self, path: &Path) -> bool {
        has_valid_extension(path, &self.file_extensions)
            && !should_ignore(path, &self.ignore)
            && !(self.skip_binary && is_likely_binary(path))
    }
}
