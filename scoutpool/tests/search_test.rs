mod common;

use anyhow::Result;
use common::{wait_until, Gate};
use scoutpool::results::TOO_MANY_ERRORS;
use scoutpool::{SearchJob, SearchLimits, SearchOptions, Task, TaskState, ThreadPool};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn create_test_files(dir: &Path, file_count: usize, line: &str) -> Result<()> {
    create_sized_files(dir, file_count, 20, line)
}

fn create_sized_files(dir: &Path, file_count: usize, lines: usize, line: &str) -> Result<()> {
    for i in 0..file_count {
        let mut file = File::create(dir.join(format!("test_{}.txt", i)))?;
        for j in 0..lines {
            writeln!(file, "{} {}", line, j)?;
        }
    }
    Ok(())
}

/// One worker, a job queued behind `blocker` and `helper` queued behind the
/// job. With a queue threshold of two the job submits one subtask and then
/// runs `helper` inline, where it stays until `helper` is opened.
fn stall_job_on_single_worker(
    dir: &Path,
    blocker: &Arc<Gate>,
    helper: &Arc<Gate>,
) -> Result<(ThreadPool, Arc<SearchJob>)> {
    let pool = ThreadPool::new(1)?;
    pool.enqueue(blocker.clone())?;
    assert!(wait_until(|| blocker.started()));

    let limits = SearchLimits {
        queue_threshold: 2,
        ..SearchLimits::default()
    };
    let job = SearchJob::with_settings(dir, "needle", pool.handle(), limits, SearchOptions::default());
    pool.enqueue(job.clone())?;
    pool.enqueue(helper.clone())?;
    blocker.open();

    assert!(wait_until(|| job.total_files() == 1 && helper.started()));
    assert_eq!(job.state(), TaskState::Running);
    Ok((pool, job))
}

fn run_to_end(pool: &ThreadPool, job: &Arc<SearchJob>) -> Result<()> {
    pool.enqueue(job.clone())?;
    assert!(wait_until(|| job.finished()), "search did not finish");
    Ok(())
}

#[test]
fn test_no_matches_still_finishes() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(dir.path(), 20, "nothing to see here")?;

    let pool = ThreadPool::new(4)?;
    let job = SearchJob::new(dir.path(), "abacaba", pool.handle());
    run_to_end(&pool, &job)?;

    assert!(job.found_all());
    assert_eq!(job.total_files(), 20);
    assert_eq!(job.completed_files(), 20);
    assert!(job.get_result().is_empty());
    assert!(job.get_failure_logs().is_empty());
    Ok(())
}

#[test]
fn test_result_entries_and_drain() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("a.txt");
    fs::write(&path, "abacaba\nno match here\nxx abacaba yy\n")?;

    let pool = ThreadPool::new(2)?;
    let job = SearchJob::new(dir.path(), "abacaba", pool.handle());
    run_to_end(&pool, &job)?;

    let expected = vec![
        format!("{}::0::1::abacaba", path.display()),
        format!("{}::3::3::xx abacaba yy", path.display()),
    ];
    assert_eq!(job.get_result(), expected);
    // Reading does not consume.
    assert_eq!(job.get_result(), expected);
    assert_eq!(job.get_result_prefix(1), expected[..1].to_vec());

    job.clear_result();
    assert!(job.get_result().is_empty());
    assert!(job.finished());
    Ok(())
}

#[test]
fn test_every_matching_line_reported_once() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(dir.path(), 15, "TODO item")?;
    fs::create_dir(dir.path().join("nested"))?;
    create_test_files(&dir.path().join("nested"), 5, "TODO nested")?;

    let pool = ThreadPool::new(4)?;
    let job = SearchJob::new(dir.path(), "TODO", pool.handle());
    run_to_end(&pool, &job)?;

    let results = job.get_result();
    assert_eq!(results.len(), 20 * 20);
    let mut unique = results.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), results.len());
    assert!(results.iter().all(|r| r.contains("::0::")));
    Ok(())
}

#[test]
fn test_single_file_root() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("only.txt");
    fs::write(&path, "first\nneedle here\n")?;

    let pool = ThreadPool::new(2)?;
    let job = SearchJob::new(&path, "needle", pool.handle());
    run_to_end(&pool, &job)?;

    assert_eq!(job.total_files(), 1);
    assert_eq!(
        job.get_result(),
        vec![format!("{}::0::2::needle here", path.display())]
    );
    Ok(())
}

#[test]
fn test_missing_root_is_a_failure() -> Result<()> {
    let dir = tempdir()?;
    let missing = dir.path().join("does-not-exist");

    let pool = ThreadPool::new(2)?;
    let job = SearchJob::new(&missing, "x", pool.handle());
    run_to_end(&pool, &job)?;

    let failures = job.get_failure_logs();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with(&format!("{}::", missing.display())));
    assert!(failures[0].contains("failed to open file"));
    assert!(job.get_result().is_empty());
    Ok(())
}

#[test]
fn test_failure_cap_per_file() -> Result<()> {
    let dir = tempdir()?;
    let mut data = Vec::new();
    for _ in 0..30 {
        data.extend_from_slice(&[0xff, 0xfe, b'\n']);
    }
    data.extend_from_slice(b"needle after the garbage\n");
    fs::write(dir.path().join("corrupt.dat"), data)?;

    let limits = SearchLimits {
        max_failures_per_file: 5,
        ..SearchLimits::default()
    };
    let pool = ThreadPool::new(2)?;
    let job = SearchJob::with_settings(
        dir.path(),
        "needle",
        pool.handle(),
        limits,
        SearchOptions::default(),
    );
    run_to_end(&pool, &job)?;

    let failures = job.get_failure_logs();
    assert_eq!(failures.len(), 6);
    assert!(failures[0].contains("corrupt data or unknown encoding at line 1"));
    assert!(failures[5].ends_with(TOO_MANY_ERRORS));
    // Scanning continues past bad lines.
    assert_eq!(job.get_result().len(), 1);

    assert_eq!(job.get_failure_logs_prefix(2), failures[..2].to_vec());
    assert_eq!(job.get_failure_logs_prefix(100), failures);
    job.clear_failure_logs();
    assert!(job.get_failure_logs().is_empty());
    assert!(job.get_failure_logs_prefix(1).is_empty());
    assert_eq!(job.get_result().len(), 1);
    assert_eq!(job.critical_errors(), 0);
    Ok(())
}

#[test]
fn test_result_cap_per_file() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(dir.path(), 1, "needle")?;

    let limits = SearchLimits {
        max_results_per_file: 3,
        ..SearchLimits::default()
    };
    let pool = ThreadPool::new(2)?;
    let job = SearchJob::with_settings(
        dir.path(),
        "needle",
        pool.handle(),
        limits,
        SearchOptions::default(),
    );
    run_to_end(&pool, &job)?;

    assert_eq!(job.get_result().len(), 3);
    let failures = job.get_failure_logs();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].ends_with("too many matches"));
    Ok(())
}

#[test]
fn test_hidden_and_gitignored_files_are_searched() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join(".gitignore"), "ignored.txt\n")?;
    fs::write(dir.path().join("ignored.txt"), "needle\n")?;
    fs::write(dir.path().join(".hidden"), "needle\n")?;

    let pool = ThreadPool::new(2)?;
    let job = SearchJob::new(dir.path(), "needle", pool.handle());
    run_to_end(&pool, &job)?;

    assert_eq!(job.total_files(), 3);
    assert_eq!(job.get_result().len(), 2);
    Ok(())
}

#[test]
fn test_search_options_filter_files() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("keep.rs"), "needle\n")?;
    fs::write(dir.path().join("skip.md"), "needle\n")?;
    fs::create_dir(dir.path().join("target"))?;
    fs::write(dir.path().join("target").join("gen.rs"), "needle\n")?;

    let options = SearchOptions {
        file_extensions: Some(vec!["rs".to_string()]),
        ignore_patterns: vec!["**/target/**".to_string()],
        skip_binary: false,
    };
    let pool = ThreadPool::new(2)?;
    let job = SearchJob::with_settings(
        dir.path(),
        "needle",
        pool.handle(),
        SearchLimits::default(),
        options,
    );
    run_to_end(&pool, &job)?;

    let results = job.get_result();
    assert_eq!(job.total_files(), 1);
    assert_eq!(results.len(), 1);
    assert!(results[0].contains("keep.rs"));
    Ok(())
}

#[test]
fn test_cancel_job_stops_discovery() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(dir.path(), 5, "needle")?;

    let (blocker, helper) = (Gate::new(0), Gate::new(1));
    let (pool, job) = stall_job_on_single_worker(dir.path(), &blocker, &helper)?;
    assert!(pool.stats().backpressure_waits >= 1);

    job.cancel();
    helper.open();
    assert!(wait_until(|| job.state() == TaskState::Cancelled));
    assert!(!job.found_all());
    assert_eq!(job.total_files(), 1);

    // The one submitted subtask still runs, sees the cancel and flushes nothing.
    assert!(wait_until(|| job.completed_files() == 1));
    assert!(job.get_result().is_empty());
    assert!(!job.finished());
    Ok(())
}

#[test]
fn test_abort_during_search_then_rerun() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(dir.path(), 3, "needle")?;

    let (blocker, helper) = (Gate::new(0), Gate::new(1));
    let (pool, job) = stall_job_on_single_worker(dir.path(), &blocker, &helper)?;

    pool.abort()?;

    assert_eq!(job.state(), TaskState::Cancelled);
    assert_eq!(helper.state(), TaskState::Cancelled);
    assert_eq!(blocker.state(), TaskState::Completed);
    assert!(!job.found_all());
    assert_eq!(job.completed_files(), 0);
    assert_eq!(pool.stats().discarded, 1);
    assert_eq!(pool.queue_size(), 0);

    // The same job runs again from scratch on the restarted pool.
    run_to_end(&pool, &job)?;
    assert_eq!(job.total_files(), 3);
    assert_eq!(job.get_result().len(), 3 * 20);
    Ok(())
}

#[test]
fn test_single_worker_search_is_not_starved() -> Result<()> {
    let dir = tempdir()?;
    create_test_files(dir.path(), 5, "needle")?;

    let limits = SearchLimits {
        queue_threshold: 2,
        ..SearchLimits::default()
    };
    let pool = ThreadPool::new(1)?;
    let job = SearchJob::with_settings(
        dir.path(),
        "needle",
        pool.handle(),
        limits,
        SearchOptions::default(),
    );
    run_to_end(&pool, &job)?;

    assert_eq!(job.total_files(), 5);
    assert_eq!(job.completed_files(), 5);
    assert_eq!(job.get_result().len(), 5 * 20);
    assert!(pool.stats().backpressure_waits >= 1);
    Ok(())
}

#[test]
fn test_reenqueue_right_after_cancel_starts_clean() -> Result<()> {
    let dir = tempdir()?;
    create_sized_files(dir.path(), 100, 100, "needle")?;

    let pool = ThreadPool::new(8)?;
    let job = SearchJob::new(dir.path(), "needle", pool.handle());
    for _ in 0..5 {
        pool.enqueue(job.clone())?;
        assert!(wait_until(|| job.completed_files() >= 3));
        job.cancel();
        assert!(wait_until(|| !job.state().is_busy()));
    }

    // Subtasks of the cancelled runs may still be queued or running here.
    run_to_end(&pool, &job)?;
    assert!(wait_until(|| pool.queue_size() == 0 && pool.stats().running == 0));

    assert_eq!(job.total_files(), 100);
    assert_eq!(job.completed_files(), job.total_files());
    assert_eq!(job.get_result().len(), 100 * 100);
    assert!(job.get_failure_logs().is_empty());
    Ok(())
}

#[test]
fn test_overlong_line_through_job() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("wide.txt");
    let wide = "needle".repeat(10);
    fs::write(&path, format!("needle one\n{}\nneedle three\n", wide))?;

    let limits = SearchLimits {
        max_line_bytes: 16,
        ..SearchLimits::default()
    };
    let pool = ThreadPool::new(2)?;
    let job = SearchJob::with_settings(
        dir.path(),
        "needle",
        pool.handle(),
        limits,
        SearchOptions::default(),
    );
    run_to_end(&pool, &job)?;

    assert_eq!(
        job.get_failure_logs(),
        vec![format!(
            "{}::line 2 is too long (more than 16 bytes)",
            path.display()
        )]
    );
    // Line numbering carries on past the skipped line.
    assert_eq!(
        job.get_result(),
        vec![
            format!("{}::0::1::needle one", path.display()),
            format!("{}::0::3::needle three", path.display()),
        ]
    );
    Ok(())
}
