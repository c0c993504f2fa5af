/// Fixed-size worker pool with a FIFO queue and a synchronous abort.
///
/// Workers sleep on a condition variable while the queue is empty, take the
/// oldest task, drop the queue lock and run the task. A panic that escapes a
/// task is caught here so a misbehaving task never takes a worker down.
///
/// [`ThreadPool::abort`] is the heavy hammer: it raises the pool-wide abort
/// flag (every attached task's `is_cancelled` turns true), joins every
/// worker, throws away whatever was still queued and starts a fresh set of
/// workers. When it returns nothing submitted before the call runs anymore.
///
/// Tasks that need to submit more work hold a [`PoolHandle`], a weak
/// reference, so a queued task never keeps its own pool alive.
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::errors::{ScoutError, ScoutResult};
use crate::metrics::{PoolStats, PoolStatsSnapshot};
use crate::task::{AbortSignal, Task, TaskState};

// Upper bound on how long a throttled producer sleeps before rechecking
// its own cancellation flag.
const BACKPRESSURE_RECHECK: Duration = Duration::from_millis(10);

thread_local! {
    // Identity of the pool that owns the current thread, if it is a worker.
    static WORKER_OF: Cell<usize> = const { Cell::new(0) };
}

struct QueueState {
    tasks: VecDeque<Arc<dyn Task>>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    work_ready: Condvar,
    space_freed: Condvar,
    abort: AbortSignal,
    stats: PoolStats,
}

impl Shared {
    fn id(&self) -> usize {
        self as *const Shared as usize
    }

    fn is_current_worker(&self) -> bool {
        WORKER_OF.with(|owner| owner.get() == self.id())
    }

    fn enqueue(&self, task: Arc<dyn Task>) -> ScoutResult<()> {
        let control = task.control();
        if !control.try_claim() {
            return Err(ScoutError::task_busy(task.describe()));
        }
        control.attach(&self.abort);
        task.prepare();

        {
            let mut state = self.queue.lock();
            state.tasks.push_back(task);
            self.stats.record_enqueue();
        }
        self.work_ready.notify_one();
        Ok(())
    }

    fn queue_size(&self) -> usize {
        self.queue.lock().tasks.len()
    }

    /// Waits until fewer than `threshold` tasks are queued.
    ///
    /// A producer that is itself one of our workers does not sleep: it pops
    /// the oldest task and runs it inline, so a pool whose workers are all
    /// producers still drains.
    fn wait_for_capacity(&self, threshold: usize, cancelled: &dyn Fn() -> bool) -> bool {
        let threshold = threshold.max(1);
        let helper = self.is_current_worker();
        let mut state = self.queue.lock();
        let mut throttled = false;
        loop {
            if state.tasks.len() < threshold {
                return true;
            }
            if cancelled() || state.shutdown {
                return false;
            }
            if !throttled {
                throttled = true;
                self.stats.record_backpressure();
            }
            if helper {
                let Some(task) = state.tasks.pop_front() else {
                    continue;
                };
                self.stats.record_dequeue();
                drop(state);
                self.space_freed.notify_all();
                trace!("Producer running {} inline", task.describe());
                execute(self, task);
                state = self.queue.lock();
                continue;
            }
            self.space_freed.wait_for(&mut state, BACKPRESSURE_RECHECK);
        }
    }

    fn begin_shutdown(&self) {
        let mut state = self.queue.lock();
        state.shutdown = true;
        self.work_ready.notify_all();
        self.space_freed.notify_all();
    }

    /// Empties the queue after the workers are gone. An abort re-opens it
    /// and starts a new generation; a shutdown leaves it closed.
    fn discard_queue(&self, reopen: bool) -> usize {
        let mut state = self.queue.lock();
        let discarded = state.tasks.len();
        for task in state.tasks.drain(..) {
            task.control().set_state(TaskState::Cancelled);
        }
        state.shutdown = !reopen;
        if reopen {
            self.stats.record_abort(discarded);
        } else {
            self.stats.record_shutdown(discarded);
        }
        discarded
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    WORKER_OF.with(|owner| owner.set(shared.id()));
    trace!("Worker {} started", index);

    loop {
        let task = {
            let mut state = shared.queue.lock();
            while state.tasks.is_empty() && !state.shutdown {
                shared.work_ready.wait(&mut state);
            }
            if state.shutdown {
                break;
            }
            let Some(task) = state.tasks.pop_front() else {
                continue;
            };
            shared.stats.record_dequeue();
            task
        };
        shared.space_freed.notify_all();
        execute(&shared, task);
    }

    trace!("Worker {} exiting", index);
}

fn execute(shared: &Shared, task: Arc<dyn Task>) {
    task.control().set_state(TaskState::Running);
    trace!("Running {}", task.describe());

    let runner = Arc::clone(&task);
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || runner.run())) {
        shared.stats.record_panic();
        warn!(
            "Task {} panicked: {}",
            task.describe(),
            panic_message(payload.as_ref())
        );
    }

    let cancelled = task.is_cancelled();
    task.control().finish(cancelled);
    shared.stats.record_completion();
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn spawn_workers(shared: &Arc<Shared>, count: usize) -> ScoutResult<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(count);
    for index in 0..count {
        let worker_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(format!("scoutpool-worker-{}", index))
            .spawn(move || worker_loop(worker_shared, index));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                shared.begin_shutdown();
                join_workers(&mut handles);
                shared.queue.lock().shutdown = false;
                return Err(ScoutError::Spawn(err));
            }
        }
    }
    Ok(handles)
}

fn join_workers(handles: &mut Vec<JoinHandle<()>>) {
    for handle in handles.drain(..) {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if handle.join().is_err() {
            warn!("{} terminated abnormally", name);
        }
    }
}

/// A fixed set of worker threads executing [`Task`]s in FIFO order.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    thread_count: usize,
}

impl ThreadPool {
    /// Starts exactly `thread_count` workers (at least one).
    pub fn new(thread_count: usize) -> ScoutResult<Self> {
        let thread_count = thread_count.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                shutdown: false,
            }),
            work_ready: Condvar::new(),
            space_freed: Condvar::new(),
            abort: AbortSignal::new(),
            stats: PoolStats::new(),
        });
        let workers = spawn_workers(&shared, thread_count)?;
        info!("Thread pool started with {} workers", thread_count);

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            thread_count,
        })
    }

    /// Prepares `task` and appends it to the queue.
    ///
    /// Fails with [`ScoutError::TaskBusy`] if the task is already queued or
    /// running somewhere.
    pub fn enqueue(&self, task: Arc<dyn Task>) -> ScoutResult<()> {
        self.shared.enqueue(task)
    }

    /// Tasks waiting in the queue, not counting running ones
    pub fn queue_size(&self) -> usize {
        self.shared.queue_size()
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.abort.is_raised()
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn log_stats(&self) {
        self.shared.stats.log_stats();
    }

    /// A non-owning handle tasks can use to submit more work.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Stops everything, discards the queue and restarts with the same
    /// number of workers. Blocks until every running task has returned.
    pub fn abort(&self) -> ScoutResult<()> {
        if self.shared.is_current_worker() {
            return Err(ScoutError::AbortFromWorker);
        }

        let mut workers = self.workers.lock();
        info!("Aborting thread pool ({} workers)", workers.len());

        self.shared.abort.raise();
        self.shared.begin_shutdown();
        join_workers(&mut workers);
        let discarded = self.shared.discard_queue(true);
        debug!("Discarded {} queued tasks", discarded);

        let restarted = spawn_workers(&self.shared, self.thread_count);
        self.shared.abort.clear();
        *workers = restarted?;

        info!("Thread pool restarted with {} workers", self.thread_count);
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.abort.raise();
        self.shared.begin_shutdown();
        let mut workers = std::mem::take(self.workers.get_mut());
        if self.shared.is_current_worker() {
            // Joining would wait on ourselves; the workers exit on their own.
            warn!("Thread pool dropped from one of its workers; detaching threads");
            workers.clear();
        } else {
            join_workers(&mut workers);
        }
        let discarded = self.shared.discard_queue(false);
        debug!("Thread pool shut down, {} queued tasks dropped", discarded);
    }
}

/// Weak reference to a [`ThreadPool`] for submitting work from inside tasks.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Weak<Shared>,
}

impl PoolHandle {
    fn upgrade(&self) -> ScoutResult<Arc<Shared>> {
        self.shared.upgrade().ok_or(ScoutError::PoolClosed)
    }

    pub fn enqueue(&self, task: Arc<dyn Task>) -> ScoutResult<()> {
        self.upgrade()?.enqueue(task)
    }

    /// Zero once the pool is gone
    pub fn queue_size(&self) -> usize {
        self.shared.upgrade().map_or(0, |shared| shared.queue_size())
    }

    /// Reports `true` once the pool is gone
    pub fn is_aborted(&self) -> bool {
        self.shared
            .upgrade()
            .map_or(true, |shared| shared.abort.is_raised())
    }

    /// Blocks until fewer than `threshold` tasks are queued.
    ///
    /// Returns `Ok(false)` as soon as `cancelled` reports true; `cancelled` is
    /// rechecked on every dequeue and at least every few milliseconds. Called
    /// from one of the pool's own workers it runs queued tasks inline instead
    /// of sleeping.
    pub fn wait_for_capacity(
        &self,
        threshold: usize,
        cancelled: impl Fn() -> bool,
    ) -> ScoutResult<bool> {
        Ok(self.upgrade()?.wait_for_capacity(threshold, &cancelled))
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
