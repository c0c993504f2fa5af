/// Entry types a search job accumulates.
///
/// Both aggregator buffers hold plain text so a consumer can display them
/// without knowing the types below. The typed values exist to build those
/// strings in one place:
///
/// ```text
/// result:  <path>::<column>::<line>::<snippet>
/// failure: <path>::<message>
/// ```
use std::fmt;
use std::path::{Path, PathBuf};

/// Written once into a subtask's failure log when its cap is reached
pub const TOO_MANY_ERRORS: &str = "TOO MANY ERRORS IN THIS FILE";

/// Sentinel for a job's result buffer once it is full
pub const RESULT_OVERFLOW: &str = "TOO MANY RESULTS, FURTHER MATCHES DROPPED";

/// Sentinel for a job's failure buffer once it is full
pub const FAILURE_OVERFLOW: &str = "TOO MANY FAILURES, FURTHER ERRORS DROPPED";

/// A single matching line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// The file containing the match
    pub path: PathBuf,
    /// Character offset of the first match within the line (0-based)
    pub column: usize,
    /// Line number (1-based)
    pub line_number: usize,
    /// Bounded excerpt of the line around the match
    pub snippet: String,
}

impl fmt::Display for LineMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}::{}",
            self.path.display(),
            self.column,
            self.line_number,
            self.snippet
        )
    }
}

/// A recoverable problem scoped to one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub message: String,
}

impl FailureRecord {
    pub fn new(path: &Path, message: impl fmt::Display) -> Self {
        Self {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.path.display(), self.message)
    }
}
