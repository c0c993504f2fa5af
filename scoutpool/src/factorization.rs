use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::task::{Task, TaskControl};

/// Outcome of a factorization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Factorization {
    /// True when cancellation stopped the run before it finished
    pub incomplete: bool,
    /// Prime factors found so far, non-decreasing
    pub factors: Vec<u64>,
}

/// Prime factorization by trial division, cancellable between any two
/// divisions.
#[derive(Debug)]
pub struct FactorizationTask {
    control: TaskControl,
    n: u64,
    result: Mutex<Factorization>,
}

impl FactorizationTask {
    pub fn new(n: u64) -> Self {
        Self {
            control: TaskControl::new(),
            n,
            result: Mutex::new(Factorization::default()),
        }
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn get_result(&self) -> Factorization {
        self.result.lock().clone()
    }

    fn push_factor(&self, factor: u64) {
        self.result.lock().factors.push(factor);
    }

    fn mark_complete(&self) {
        self.result.lock().incomplete = false;
    }
}

impl Task for FactorizationTask {
    fn control(&self) -> &TaskControl {
        &self.control
    }

    fn prepare(&self) {
        let mut result = self.result.lock();
        result.factors.clear();
        result.incomplete = true;
    }

    fn run(self: Arc<Self>) {
        self.prepare();
        let mut remaining = self.n;
        if remaining < 2 {
            self.mark_complete();
            return;
        }

        let mut divisor: u64 = 2;
        while divisor <= remaining / divisor {
            if self.is_cancelled() {
                debug!("Factorization of {} cancelled at divisor {}", self.n, divisor);
                return;
            }
            while remaining % divisor == 0 {
                if self.is_cancelled() {
                    debug!("Factorization of {} cancelled at divisor {}", self.n, divisor);
                    return;
                }
                self.push_factor(divisor);
                remaining /= divisor;
            }
            divisor += 1;
        }
        if remaining > 1 {
            self.push_factor(remaining);
        }
        self.mark_complete();
    }

    fn describe(&self) -> String {
        format!("factorize({})", self.n)
    }
}
