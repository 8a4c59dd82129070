//! Fixed-size worker pool draining one MPMC ring.
//!
//! Generalized over the ring's item type so the same engine backs both
//! the general-purpose `Job{fn,ctx}` pool and the job scheduler's
//! arena-slot dispatch variant, which are really one component
//! parameterized over what a worker does with a dequeued item, not two.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, instrument};

use crate::error::{Result, SeakError};
use crate::ring::mpmc;

/// A type-erased unit of work for the general-purpose pool: a function
/// pointer plus a caller-owned context pointer.
///
/// `ctx` is never dereferenced by the pool itself; the one `unsafe`
/// boundary this contract requires sits at the call site inside
/// [`func`](Job::func), not in code that merely constructs or queues a
/// `Job`.
pub struct Job {
    pub func: unsafe fn(*mut ()),
    pub ctx: *mut (),
}

// `ctx` crosses thread boundaries by raw pointer; the caller that built
// it is responsible for it actually being safe to hand off.
unsafe impl Send for Job {}

/// Box a plain closure and wrap it as a [`Job`], pairing a type-erased
/// trampoline with the boxed closure as its context. This is the typed,
/// safe path into the `Job{fn,ctx}` contract — user code never
/// constructs a raw `Job` or touches `unsafe` directly.
pub fn spawn_closure<F>(f: F) -> Job
where
    F: FnOnce() + Send + 'static,
{
    unsafe fn call_and_drop<F: FnOnce() + Send>(ptr: *mut ()) {
        let boxed = Box::from_raw(ptr as *mut F);
        (*boxed)();
    }

    let ctx = Box::into_raw(Box::new(f)) as *mut ();
    Job { func: call_and_drop::<F>, ctx }
}

type Body<T> = dyn Fn(T, &mpmc::Sender<T>) + Send + Sync;

/// A fixed set of OS threads draining one MPMC ring of work items of
/// type `T`.
pub struct WorkerPool<T: Send + 'static> {
    dispatcher: mpmc::Sender<T>,
    // `Mutex`-wrapped so `shutdown` can join every thread through `&self`:
    // the scheduler keeps its pool behind a `OnceLock<Scheduler>`, which
    // only ever hands out shared references.
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Start `n` worker threads, each holding its own `Sender`/`Receiver`
    /// pair against an MPMC ring of `ring_capacity` slots.
    ///
    /// `body` is invoked with each dequeued item and the worker's own
    /// `Sender`, letting it self-dispatch continuations without routing
    /// back through the external dispatcher. That routing choice is
    /// load-bearing: if every worker were blocked trying to send on a
    /// full ring through the one external dispatcher, and the dispatcher
    /// were itself blocked, the pool would deadlock. Each worker sending
    /// through its own handle instead means the only way a worker blocks
    /// is behind its own already-in-flight work.
    #[instrument(skip(body))]
    pub fn new(
        n: usize,
        ring_capacity: usize,
        body: impl Fn(T, &mpmc::Sender<T>) + Send + Sync + 'static,
    ) -> Result<Self> {
        if n == 0 {
            return Err(SeakError::AllocFailure);
        }
        let (dispatcher, rx0) = mpmc::create::<T>(ring_capacity)?;
        let body: Arc<Body<T>> = Arc::new(body);

        let threads = (0..n)
            .map(|id| {
                let rx = rx0.clone();
                let tx = dispatcher.clone();
                let body = body.clone();
                thread::spawn(move || worker_loop(id, rx, tx, body))
            })
            .collect();
        drop(rx0);

        info!(workers = n, ring_capacity, "worker pool started");
        Ok(Self { dispatcher, threads: Mutex::new(threads) })
    }

    /// Submit `item` to the pool's dispatch ring.
    pub fn execute(&self, item: T) -> Result<()> {
        self.dispatcher.try_send(item)
    }

    /// Close the dispatch ring and join every worker thread. Workers
    /// drain whatever is already queued before exiting; this does not
    /// wait for in-flight continuations a worker might still self-
    /// dispatch after observing `Closed` mid-drain.
    ///
    /// Takes `&self`, not `self`, so a pool held behind a shared
    /// singleton (the job scheduler's `OnceLock<Scheduler>`) can still be
    /// torn down; calling it twice is harmless (the second call joins an
    /// already-empty thread list against an already-closed ring).
    pub fn shutdown(&self) {
        self.dispatcher.close();
        let mut threads = self.threads.lock().expect("worker pool thread list poisoned");
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        debug!("worker pool shut down");
    }
}

#[instrument(skip(rx, tx, body))]
fn worker_loop<T: Send + 'static>(
    id: usize,
    rx: mpmc::Receiver<T>,
    tx: mpmc::Sender<T>,
    body: Arc<Body<T>>,
) {
    loop {
        match rx.recv() {
            Ok(item) => body(item, &tx),
            Err(SeakError::Closed) => {
                debug!(worker = id, "worker draining closed ring, exiting");
                break;
            }
            Err(e) => unreachable!("mpmc blocking recv never returns {e:?}"),
        }
    }
}

impl WorkerPool<Job> {
    /// Convenience constructor for the general-purpose pool: runs each
    /// submitted job's function directly, with no continuation
    /// self-dispatch of its own.
    pub fn new_general(n: usize, ring_capacity: usize) -> Result<Self> {
        Self::new(n, ring_capacity, |job: Job, _self_tx| unsafe {
            (job.func)(job.ctx);
        })
    }

    /// Same as [`WorkerPool::new_general`], sized to the host's available
    /// parallelism (`num_cpus::get()`) instead of a caller-supplied `n`.
    pub fn new_general_default(ring_capacity: usize) -> Result<Self> {
        Self::new_general(num_cpus::get().max(1), ring_capacity)
    }
}

/// A worker count sized to the host's available parallelism, for callers
/// (the job scheduler's default setup) that want a reasonable pool size
/// without hand-picking one.
pub fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn general_pool_runs_submitted_closures() {
        let pool = WorkerPool::<Job>::new_general(4, 16).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..1000 {
            let counter = counter.clone();
            loop {
                let job = spawn_closure(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
                if pool.execute(job).is_ok() {
                    break;
                }
                std::hint::spin_loop();
            }
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn workers_self_dispatch_continuations() {
        // A body that, on receiving `n > 0`, re-submits `n - 1` through
        // its own sender instead of the external dispatcher.
        let done = Arc::new(AtomicUsize::new(0));
        let done_body = done.clone();
        let pool = WorkerPool::<u64>::new(2, 8, move |n: u64, self_tx| {
            if n == 0 {
                done_body.fetch_add(1, Ordering::Relaxed);
            } else {
                loop {
                    if self_tx.try_send(n - 1).is_ok() {
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
        })
        .unwrap();

        for _ in 0..50 {
            loop {
                if pool.execute(5).is_ok() {
                    break;
                }
                std::hint::spin_loop();
            }
        }

        // Give the self-dispatched chains a chance to fully unwind
        // before shutting the ring down.
        while done.load(Ordering::Relaxed) < 50 {
            std::hint::spin_loop();
        }
        pool.shutdown();
        assert_eq!(done.load(Ordering::Relaxed), 50);
    }
}
