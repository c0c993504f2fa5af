use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{ScoutError, ScoutResult};
use crate::search::{
    SearchLimits, SearchOptions, DEFAULT_FAILURE_CAPACITY, DEFAULT_FLUSH_BATCH_SIZE,
    DEFAULT_MAX_FAILURES_PER_FILE, DEFAULT_MAX_LINE_BYTES, DEFAULT_MAX_RESULTS_PER_FILE,
    DEFAULT_QUEUE_THRESHOLD, DEFAULT_RESULT_CAPACITY, DEFAULT_SNIPPET_WIDTH,
};

/// Tunables for the pool and for every search job it runs.
///
/// # Configuration Locations
///
/// Files are layered in this order, later ones overriding earlier ones:
/// 1. Global `$XDG_CONFIG_HOME/scoutpool/config.yaml`
/// 2. Local `.scoutpool.yaml` in the current directory
/// 3. Custom file passed via `--config`
///
/// Every key is optional. Example:
/// ```yaml
/// thread_count: 8
/// queue_threshold: 5000
/// snippet_width: 120
/// max_results_per_file: 100
/// file_extensions: ["rs", "toml"]
/// ignore_patterns: ["**/target/**", "**/.git/**"]
/// log_level: "info"
/// ```
///
/// Command-line flags win over all files, see [`ScoutConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    /// Worker threads (default: CPU cores)
    pub thread_count: usize,
    /// Discovery pauses while this many tasks are queued
    pub queue_threshold: usize,
    pub flush_batch_size: usize,
    pub snippet_width: usize,
    pub max_results_per_file: usize,
    pub max_failures_per_file: usize,
    pub max_line_bytes: usize,
    pub result_capacity: usize,
    pub failure_capacity: usize,
    /// Only search files with these extensions; all files when unset
    pub file_extensions: Option<Vec<String>>,
    /// Glob patterns of paths to skip
    pub ignore_patterns: Vec<String>,
    pub skip_binary: bool,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            thread_count: num_cpus::get().max(1),
            queue_threshold: DEFAULT_QUEUE_THRESHOLD,
            flush_batch_size: DEFAULT_FLUSH_BATCH_SIZE,
            snippet_width: DEFAULT_SNIPPET_WIDTH,
            max_results_per_file: DEFAULT_MAX_RESULTS_PER_FILE,
            max_failures_per_file: DEFAULT_MAX_FAILURES_PER_FILE,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            failure_capacity: DEFAULT_FAILURE_CAPACITY,
            file_extensions: None,
            ignore_patterns: Vec::new(),
            skip_binary: false,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub thread_count: Option<usize>,
    pub queue_threshold: Option<usize>,
    pub snippet_width: Option<usize>,
    pub max_results_per_file: Option<usize>,
    pub file_extensions: Option<Vec<String>>,
    pub ignore_patterns: Vec<String>,
    pub skip_binary: bool,
    pub log_level: Option<String>,
}

impl ScoutConfig {
    /// Loads configuration from the default locations
    pub fn load() -> ScoutResult<Self> {
        Self::load_from(None)
    }

    /// Loads the default locations plus `config_path`, which must exist
    pub fn load_from(config_path: Option<&Path>) -> ScoutResult<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ScoutError::config_error(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
        }

        let mut builder = ConfigBuilder::builder();
        let config_files = [
            dirs::config_dir().map(|p| p.join("scoutpool/config.yaml")),
            Some(PathBuf::from(".scoutpool.yaml")),
            config_path.map(PathBuf::from),
        ];
        for path in config_files.iter().flatten() {
            if path.exists() {
                tracing::debug!("Loading config from {}", path.display());
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no pool or job can work with
    pub fn validate(&self) -> ScoutResult<()> {
        let positive = [
            ("thread_count", self.thread_count),
            ("queue_threshold", self.queue_threshold),
            ("flush_batch_size", self.flush_batch_size),
            ("max_line_bytes", self.max_line_bytes),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ScoutError::config_error(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(threads) = cli.thread_count {
            self.thread_count = threads;
        }
        if let Some(threshold) = cli.queue_threshold {
            self.queue_threshold = threshold;
        }
        if let Some(width) = cli.snippet_width {
            self.snippet_width = width;
        }
        if let Some(max) = cli.max_results_per_file {
            self.max_results_per_file = max;
        }
        if cli.file_extensions.is_some() {
            self.file_extensions = cli.file_extensions;
        }
        if !cli.ignore_patterns.is_empty() {
            self.ignore_patterns = cli.ignore_patterns;
        }
        if cli.skip_binary {
            self.skip_binary = true;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }

    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            queue_threshold: self.queue_threshold,
            flush_batch_size: self.flush_batch_size,
            snippet_width: self.snippet_width,
            max_results_per_file: self.max_results_per_file,
            max_failures_per_file: self.max_failures_per_file,
            max_line_bytes: self.max_line_bytes,
            result_capacity: self.result_capacity,
            failure_capacity: self.failure_capacity,
        }
    }

    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            file_extensions: self.file_extensions.clone(),
            ignore_patterns: self.ignore_patterns.clone(),
            skip_binary: self.skip_binary,
        }
    }

    /// Effective configuration as YAML
    pub fn to_yaml(&self) -> ScoutResult<String> {
        serde_yaml::to_string(self).map_err(|e| ScoutError::config_error(e.to_string()))
    }
}
