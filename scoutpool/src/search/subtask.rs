use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use super::job::SearchJob;
use super::snippet::{build_snippet, char_column};
use super::SearchLimits;
use crate::errors::{ScoutError, ScoutResult};
use crate::results::{FailureRecord, LineMatch, TOO_MANY_ERRORS};
use crate::task::{Task, TaskControl};

const BUFFER_CAPACITY: usize = 64 * 1024;

/// Everything one subtask collected from its file, kept local until flush.
#[derive(Debug)]
pub(crate) struct FileScan {
    path: PathBuf,
    results: Vec<String>,
    failures: Vec<String>,
    max_results: usize,
    max_failures: usize,
    critical: usize,
}

impl FileScan {
    pub(crate) fn new(path: PathBuf, limits: &SearchLimits) -> Self {
        Self {
            path,
            results: Vec::new(),
            failures: Vec::new(),
            max_results: limits.max_results_per_file,
            max_failures: limits.max_failures_per_file,
            critical: 0,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn results(&self) -> &[String] {
        &self.results
    }

    pub(crate) fn failures(&self) -> &[String] {
        &self.failures
    }

    pub(crate) fn critical(&self) -> usize {
        self.critical
    }

    fn results_full(&self) -> bool {
        self.results.len() >= self.max_results
    }

    pub(crate) fn push_result(&mut self, entry: String) {
        if self.results_full() {
            return;
        }
        if self.results.try_reserve(1).is_err() {
            self.critical += 1;
            return;
        }
        self.results.push(entry);
    }

    /// Records a failure; at the cap a single sentinel is written instead and
    /// everything after it is dropped.
    pub(crate) fn record_failure(&mut self, message: impl Display) {
        let entry = match self.failures.len() {
            n if n < self.max_failures => FailureRecord::new(&self.path, message),
            n if n == self.max_failures => FailureRecord::new(&self.path, TOO_MANY_ERRORS),
            _ => return,
        };
        if self.failures.try_reserve(1).is_err() {
            self.critical += 1;
            return;
        }
        self.failures.push(entry.to_string());
    }
}

enum LineRead {
    Eof,
    Line,
    TooLong,
}

/// Reads one line into `buf`, never buffering more than `limit + 1` bytes.
/// An overlong line is consumed up to its newline and reported as `TooLong`.
fn read_bounded_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> io::Result<LineRead> {
    buf.clear();
    let read = reader
        .by_ref()
        .take(limit as u64 + 1)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.last() == Some(&b'\n') || buf.len() <= limit {
        return Ok(LineRead::Line);
    }

    buf.clear();
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            break;
        }
        let len = chunk.len();
        reader.consume(len);
    }
    Ok(LineRead::TooLong)
}

/// Strips the line terminator and rejects undecodable or non-printable text.
fn decode_line(bytes: &[u8]) -> Option<&str> {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let line = std::str::from_utf8(bytes).ok()?;
    if line.chars().any(|c| c.is_control() && c != '\t') {
        return None;
    }
    Some(line)
}

/// Searches one file on behalf of a [`SearchJob`].
pub struct FileSearchSubtask {
    control: TaskControl,
    path: PathBuf,
    parent: Arc<SearchJob>,
    epoch: u64,
}

impl FileSearchSubtask {
    pub(crate) fn new(path: PathBuf, parent: Arc<SearchJob>, epoch: u64) -> Self {
        Self {
            control: TaskControl::new(),
            path,
            parent,
            epoch,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scan(&self, scan: &mut FileScan) -> ScoutResult<()> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) => {
                let err = ScoutError::from_io(&self.path, err);
                debug!("Cannot open {}: {}", self.path.display(), err);
                scan.record_failure(format!("failed to open file: {}", err));
                return Ok(());
            }
        };
        let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
        let limits = self.parent.limits();
        let needle = self.parent.substring();
        let needle_chars = needle.chars().count();
        let mut buf = Vec::with_capacity(256);
        let mut line_number = 0;

        loop {
            if self.is_cancelled() {
                trace!("Scan of {} cancelled at line {}", self.path.display(), line_number);
                return Ok(());
            }

            let read = read_bounded_line(&mut reader, &mut buf, limits.max_line_bytes)?;
            match read {
                LineRead::Eof => return Ok(()),
                LineRead::TooLong => {
                    line_number += 1;
                    scan.record_failure(ScoutError::line_too_long(
                        &self.path,
                        line_number,
                        limits.max_line_bytes,
                    ));
                    continue;
                }
                LineRead::Line => line_number += 1,
            }

            let Some(line) = decode_line(&buf) else {
                scan.record_failure(ScoutError::encoding(&self.path, line_number));
                continue;
            };

            if let Some(byte_index) = line.find(needle) {
                if scan.results_full() {
                    scan.record_failure("too many matches");
                    debug!("Match cap reached in {}", self.path.display());
                    return Ok(());
                }
                let column = char_column(line, byte_index);
                let found = LineMatch {
                    path: self.path.clone(),
                    column,
                    line_number,
                    snippet: build_snippet(line, column, needle_chars, limits.snippet_width),
                };
                scan.push_result(found.to_string());
            }
        }
    }
}

impl Task for FileSearchSubtask {
    fn control(&self) -> &TaskControl {
        &self.control
    }

    /// Also true once the parent has been re-prepared for a newer run.
    fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
            || self.parent.is_cancelled()
            || self.epoch != self.parent.epoch()
    }

    fn run(self: Arc<Self>) {
        let mut scan = FileScan::new(self.path.clone(), self.parent.limits());

        match panic::catch_unwind(AssertUnwindSafe(|| self.scan(&mut scan))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => scan.record_failure(format!("read error: {}", err)),
            Err(_) => scan.record_failure("an unknown error occurred"),
        }

        self.parent.complete_file(self.epoch, scan);
    }

    fn describe(&self) -> String {
        format!("grep({})", self.path.display())
    }
}
