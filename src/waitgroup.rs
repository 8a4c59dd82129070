//! Phase-barrier wait group.
//!
//! No internal scheduling: the caller is solely responsible for calling
//! `done()` exactly once per unit of work it previously promised via
//! `new`/`add`.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::cpu::pause;

/// A countdown barrier: `wait()` spins until every promised unit of work
/// has called `done()`.
pub struct WaitGroup {
    count: AtomicI64,
}

impl WaitGroup {
    /// Initialize the counter to `n`.
    pub fn new(n: i64) -> Self {
        Self { count: AtomicI64::new(n) }
    }

    /// Atomically increase the counter by `n` (may be negative).
    pub fn add(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Release);
    }

    /// Mark one unit of work as finished.
    pub fn done(&self) {
        self.count.fetch_sub(1, Ordering::Release);
    }

    /// Spin until the counter reaches zero.
    pub fn wait(&self) {
        while self.count.load(Ordering::Acquire) != 0 {
            pause();
        }
    }

    /// The counter's current value, mainly for diagnostics and tests.
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }
}
