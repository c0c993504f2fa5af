#![allow(dead_code)]

use scoutpool::{Task, TaskControl};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Polls `cond` until it holds or five seconds pass.
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Occupies a worker until opened or cancelled.
pub struct Gate {
    control: TaskControl,
    pub id: usize,
    open: AtomicBool,
    started: AtomicBool,
    runs: AtomicUsize,
}

impl Gate {
    pub fn new(id: usize) -> Arc<Self> {
        Arc::new(Self {
            control: TaskControl::new(),
            id,
            open: AtomicBool::new(false),
            started: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
        })
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Task for Gate {
    fn control(&self) -> &TaskControl {
        &self.control
    }

    fn run(self: Arc<Self>) {
        self.started.store(true, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        while !self.open.load(Ordering::SeqCst) && !self.is_cancelled() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn describe(&self) -> String {
        format!("gate({})", self.id)
    }
}
