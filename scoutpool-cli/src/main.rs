use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use scoutpool::{
    CliOverrides, FactorizationTask, ScoutConfig, SearchJob, Task, TaskState, ThreadPool,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Entries taken from each buffer per tick
const DRAIN_BATCH: usize = 1_000;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file layered over the global and local ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct SearchArgs {
    /// File or directory to search
    path: PathBuf,

    /// Literal text to look for
    substring: String,

    /// File extensions to include (e.g. rs,go,js)
    #[arg(short = 'e', long)]
    extensions: Option<String>,

    /// Patterns to ignore (glob format)
    #[arg(short, long)]
    ignore: Vec<String>,

    /// Skip files with well-known binary extensions
    #[arg(long)]
    skip_binary: bool,

    /// Maximum snippet width in characters
    #[arg(long)]
    snippet_width: Option<usize>,

    /// Maximum matches reported per file
    #[arg(long)]
    max_results: Option<usize>,

    /// Queued tasks at which discovery pauses
    #[arg(long)]
    queue_threshold: Option<usize>,

    /// Polling interval in milliseconds
    #[arg(long, default_value = "100")]
    tick_ms: u64,

    /// Cancel the search after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Show only statistics, not matches
    #[arg(short, long)]
    stats: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search files for a substring
    Search(Box<SearchArgs>),

    /// Factorize a number by trial division
    Factor {
        /// Number to factorize
        n: u64,

        /// Polling interval in milliseconds
        #[arg(long, default_value = "50")]
        tick_ms: u64,

        /// Cancel after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut overrides = CliOverrides {
        thread_count: cli.threads,
        log_level: cli.log_level,
        ..CliOverrides::default()
    };
    if let Commands::Search(args) = &cli.command {
        overrides.file_extensions = args.extensions.as_ref().map(|e| {
            e.split(',')
                .map(|s| s.trim().to_string())
                .collect::<Vec<_>>()
        });
        overrides.ignore_patterns = args.ignore.clone();
        overrides.skip_binary = args.skip_binary;
        overrides.snippet_width = args.snippet_width;
        overrides.max_results_per_file = args.max_results;
        overrides.queue_threshold = args.queue_threshold;
    }

    let config = ScoutConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?
        .merge_with_cli(overrides);
    config.validate()?;
    init_logging(&config.log_level);

    match cli.command {
        Commands::Search(args) => search(&config, &args),
        Commands::Factor {
            n,
            tick_ms,
            timeout_ms,
        } => factor(n, tick_ms, timeout_ms),
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    bar.set_style(style);
    bar
}

fn search(config: &ScoutConfig, args: &SearchArgs) -> Result<()> {
    let pool = ThreadPool::new(config.thread_count).context("failed to start thread pool")?;
    let job = SearchJob::with_settings(
        &args.path,
        args.substring.as_str(),
        pool.handle(),
        config.limits(),
        config.options(),
    );

    let started = Instant::now();
    let deadline = args.timeout_ms.map(|ms| started + Duration::from_millis(ms));
    let tick = Duration::from_millis(args.tick_ms.max(1));
    let bar = progress_bar(args.no_progress || args.stats);

    pool.enqueue(job.clone())?;
    info!("Searching {} for {:?}", args.path.display(), args.substring);

    let mut matches = 0usize;
    let mut failures = 0usize;
    let mut timed_out = false;
    loop {
        let done = job.finished();
        matches += drain(&job, &bar, args.stats, true);
        failures += drain(&job, &bar, args.stats, false);
        bar.set_length(job.total_files() as u64);
        bar.set_position(job.completed_files() as u64);

        let drained_after_cancel =
            job.state() == TaskState::Cancelled && job.completed_files() == job.total_files();
        if done || drained_after_cancel {
            break;
        }
        if !timed_out && deadline.is_some_and(|d| Instant::now() >= d) {
            timed_out = true;
            job.cancel();
            bar.set_message("cancelling");
        }
        thread::sleep(tick);
    }
    bar.finish_and_clear();

    let elapsed = humantime::format_duration(Duration::from_millis(
        started.elapsed().as_millis() as u64,
    ));
    if timed_out {
        println!(
            "{} after {} ({} of {} files searched)",
            "Search cancelled".yellow(),
            elapsed,
            job.completed_files(),
            job.total_files()
        );
    }
    println!(
        "\nFound {} matches in {} files ({} failures) in {}",
        matches,
        job.total_files(),
        failures,
        elapsed
    );
    if job.critical_errors() > 0 {
        println!(
            "{} {} errors could not be recorded",
            "Warning:".red(),
            job.critical_errors()
        );
    }
    pool.log_stats();
    Ok(())
}

/// Prints and removes whatever one buffer holds right now.
fn drain(job: &SearchJob, bar: &ProgressBar, stats_only: bool, results: bool) -> usize {
    let mut total = 0;
    loop {
        let entries = if results {
            job.drain_result(DRAIN_BATCH)
        } else {
            job.drain_failure_logs(DRAIN_BATCH)
        };
        if entries.is_empty() {
            return total;
        }
        total += entries.len();
        if !stats_only {
            bar.suspend(|| {
                for entry in &entries {
                    if results {
                        print_match(entry);
                    } else {
                        eprintln!("{}", entry.red());
                    }
                }
            });
        }
    }
}

fn print_match(entry: &str) {
    let parts: Vec<&str> = entry.splitn(4, "::").collect();
    match parts.as_slice() {
        [path, column, line, snippet] => println!(
            "{}:{}:{}: {}",
            path.blue(),
            line.green(),
            column.green(),
            snippet
        ),
        _ => println!("{}", entry.yellow()),
    }
}

fn factor(n: u64, tick_ms: u64, timeout_ms: Option<u64>) -> Result<()> {
    let pool = ThreadPool::new(1).context("failed to start thread pool")?;
    let task = Arc::new(FactorizationTask::new(n));
    let started = Instant::now();
    let deadline = timeout_ms.map(|ms| started + Duration::from_millis(ms));
    let tick = Duration::from_millis(tick_ms.max(1));

    pool.enqueue(task.clone())?;
    let mut cancelled = false;
    while task.state().is_busy() {
        if !cancelled && deadline.is_some_and(|d| Instant::now() >= d) {
            cancelled = true;
            task.cancel();
        }
        thread::sleep(tick);
    }

    let result = task.get_result();
    let factors: Vec<String> = result.factors.iter().map(u64::to_string).collect();
    let line = format!("{} = [{}]", n, factors.join(", "));
    if result.incomplete {
        println!("{} {}", line, "(incomplete)".yellow());
    } else {
        println!("{}", line.green());
    }
    Ok(())
}
