/// The unit-of-work contract shared by every workload the pool runs.
///
/// A task is a value behind an `Arc` that the pool can `prepare` and `run`
/// any number of times (one run at a time). Cancellation is cooperative: a
/// task polls [`Task::is_cancelled`] at a bounded granularity inside `run`
/// and returns early when it sees `true`. Nothing ever interrupts a running
/// task from the outside.
///
/// Implementors embed a [`TaskControl`] and hand it out through
/// [`Task::control`]; the default methods build `cancel`, `is_cancelled` and
/// `state` on top of it.
///
/// ```rust,ignore
/// struct Sleeper {
///     control: TaskControl,
/// }
///
/// impl Task for Sleeper {
///     fn control(&self) -> &TaskControl {
///         &self.control
///     }
///
///     fn run(self: Arc<Self>) {
///         while !self.is_cancelled() {
///             std::thread::sleep(Duration::from_millis(1));
///         }
///     }
/// }
/// ```
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of a task as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Constructed, or finished and not yet re-submitted
    Idle,
    /// Prepared and waiting in a pool queue
    Queued,
    /// Inside `run` on a worker thread
    Running,
    /// `run` returned without observing cancellation
    Completed,
    /// `run` returned after observing cancellation, or the task was discarded
    /// from the queue by an abort
    Cancelled,
}

impl TaskState {
    fn as_u8(self) -> u8 {
        match self {
            TaskState::Idle => 0,
            TaskState::Queued => 1,
            TaskState::Running => 2,
            TaskState::Completed => 3,
            TaskState::Cancelled => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => TaskState::Queued,
            2 => TaskState::Running,
            3 => TaskState::Completed,
            4 => TaskState::Cancelled,
            _ => TaskState::Idle,
        }
    }

    /// Whether the task is currently owned by a pool
    pub fn is_busy(self) -> bool {
        matches!(self, TaskState::Queued | TaskState::Running)
    }
}

/// Pool-wide abort flag shared between a pool and every task it accepted.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-task cancellation and lifecycle bookkeeping.
#[derive(Debug, Default)]
pub struct TaskControl {
    cancelled: AtomicBool,
    state: AtomicU8,
    pool_abort: RwLock<Option<AbortSignal>>,
}

impl TaskControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cooperative cancellation of this task only.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once `cancel` was called or the owning pool is aborting.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        self.pool_abort
            .read()
            .as_ref()
            .is_some_and(AbortSignal::is_raised)
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the task to `Queued` unless it is already queued or running.
    pub(crate) fn try_claim(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if TaskState::from_u8(current).is_busy() {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                TaskState::Queued.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Links the task to `signal` and clears any earlier cancel request.
    pub(crate) fn attach(&self, signal: &AbortSignal) {
        *self.pool_abort.write() = Some(signal.clone());
        self.cancelled.store(false, Ordering::Release);
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn finish(&self, cancelled: bool) {
        self.set_state(if cancelled {
            TaskState::Cancelled
        } else {
            TaskState::Completed
        });
    }
}

/// A cancellable, restartable unit of work.
pub trait Task: Send + Sync + 'static {
    /// The embedded lifecycle bookkeeping
    fn control(&self) -> &TaskControl;

    /// Resets per-run state. The pool calls this once per `enqueue`, before
    /// any worker can see the task.
    fn prepare(&self) {}

    /// Performs the work. Must not panic on ordinary failures and must poll
    /// `is_cancelled` often enough to bound cancellation latency.
    fn run(self: Arc<Self>);

    fn cancel(&self) {
        self.control().cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.control().is_cancelled()
    }

    fn state(&self) -> TaskState {
        self.control().state()
    }

    /// Short human-readable label used in logs and errors
    fn describe(&self) -> String {
        "task".to_string()
    }
}
