/// Error types for scoutpool.
///
/// Two families live here. Scheduler errors (`PoolClosed`, `TaskBusy`,
/// `AbortFromWorker`, `Spawn`) are returned to whoever drives the pool.
/// Per-file errors (`FileNotFound`, `PermissionDenied`, `Encoding`,
/// `LineTooLong`, `Io`) never escape a task: a subtask renders them through
/// `Display` into its failure log and carries on.
///
/// ```rust,ignore
/// match pool.enqueue(task) {
///     Ok(()) => {}
///     Err(ScoutError::TaskBusy(name)) => eprintln!("{name} is still running"),
///     Err(e) => return Err(e),
/// }
/// ```
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for scheduler and search operations
pub type ScoutResult<T> = Result<T, ScoutError>;

/// Errors that can occur while scheduling or running tasks
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("corrupt data or unknown encoding at line {line}")]
    Encoding { path: PathBuf, line: usize },
    #[error("line {line} is too long (more than {limit} bytes)")]
    LineTooLong {
        path: PathBuf,
        line: usize,
        limit: usize,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("thread pool is no longer running")]
    PoolClosed,
    #[error("task {0} is already queued or running")]
    TaskBusy(String),
    #[error("abort() cannot be called from one of the pool's own workers")]
    AbortFromWorker,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

impl ScoutError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn encoding(path: impl Into<PathBuf>, line: usize) -> Self {
        Self::Encoding {
            path: path.into(),
            line,
        }
    }

    pub fn line_too_long(path: impl Into<PathBuf>, line: usize, limit: usize) -> Self {
        Self::LineTooLong {
            path: path.into(),
            line,
            limit,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn task_busy(name: impl Into<String>) -> Self {
        Self::TaskBusy(name.into())
    }

    /// Maps an I/O error on `path` to the most specific variant.
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::file_not_found(path),
            io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }
}

impl From<config::ConfigError> for ScoutError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}
