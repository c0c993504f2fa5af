use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scoutpool::{SearchJob, ThreadPool};
use std::{fs::File, io::Write, thread, time::Duration};
use tempfile::tempdir;

fn create_test_files(
    dir: &tempfile::TempDir,
    file_count: usize,
    lines_per_file: usize,
) -> std::io::Result<()> {
    for i in 0..file_count {
        let file_path = dir.path().join(format!("test_{}.txt", i));
        let mut file = File::create(file_path)?;
        for j in 0..lines_per_file {
            writeln!(
                file,
                "Line {} TODO: fix bug {} FIXME: optimize line {} NOTE: important task {}",
                j, j, j, j
            )?;
        }
    }
    Ok(())
}

fn run_search(pool: &ThreadPool, dir: &tempfile::TempDir, needle: &str) -> usize {
    let job = SearchJob::new(dir.path(), needle, pool.handle());
    if pool.enqueue(job.clone()).is_err() {
        return 0;
    }
    while !job.finished() {
        thread::sleep(Duration::from_micros(200));
    }
    job.get_result().len()
}

fn bench_full_search(c: &mut Criterion) {
    let dir = tempdir().expect("temp dir");
    create_test_files(&dir, 200, 100).expect("test files");

    let mut group = c.benchmark_group("full_search");
    for threads in [1usize, 2, 4, 8] {
        let pool = ThreadPool::new(threads).expect("pool");
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, _| {
            b.iter(|| black_box(run_search(&pool, &dir, "TODO")))
        });
    }
    group.finish();
}

fn bench_no_matches(c: &mut Criterion) {
    let dir = tempdir().expect("temp dir");
    create_test_files(&dir, 200, 100).expect("test files");
    let pool = ThreadPool::new(num_cpus::get()).expect("pool");

    c.bench_function("search_no_matches", |b| {
        b.iter(|| black_box(run_search(&pool, &dir, "abacaba")))
    });
}

criterion_group!(benches, bench_full_search, bench_no_matches);
criterion_main!(benches);
