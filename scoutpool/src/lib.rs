//! A cancellable, self-expanding task scheduler.
//!
//! [`ThreadPool`] runs [`Task`]s on a fixed set of workers in FIFO order and
//! can abort everything synchronously. [`SearchJob`] and
//! [`FactorizationTask`] are the two workloads shipped with it: the first
//! fans out one subtask per file into the same pool, the second is a single
//! long computation that polls for cancellation between divisions.
//!
//! ```rust,no_run
//! use scoutpool::{SearchJob, ThreadPool};
//!
//! let pool = ThreadPool::new(4)?;
//! let job = SearchJob::new("src", "TODO", pool.handle());
//! pool.enqueue(job.clone())?;
//! while !job.finished() {
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! for line in job.get_result() {
//!     println!("{line}");
//! }
//! # Ok::<(), scoutpool::ScoutError>(())
//! ```

pub mod aggregator;
pub mod config;
pub mod errors;
pub mod factorization;
pub mod filters;
pub mod metrics;
pub mod pool;
pub mod results;
pub mod search;
pub mod task;

pub use aggregator::Aggregator;
pub use config::{CliOverrides, ScoutConfig};
pub use errors::{ScoutError, ScoutResult};
pub use factorization::{Factorization, FactorizationTask};
pub use metrics::{PoolStats, PoolStatsSnapshot};
pub use pool::{PoolHandle, ThreadPool};
pub use results::{FailureRecord, LineMatch};
pub use search::{FileSearchSubtask, SearchJob, SearchLimits, SearchOptions};
pub use task::{AbortSignal, Task, TaskControl, TaskState};
