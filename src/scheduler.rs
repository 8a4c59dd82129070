//! Dependency-aware job scheduler.
//!
//! A process-wide singleton built on a fixed [`WorkerPool`] and a
//! [`RegionArena`] of `JobRecord`s. Jobs are fire-and-forget with at most
//! one successor (`continuation`); fan-in is expressed by linking several
//! predecessors to the same successor through separate [`then`] calls.
//! There are no fan-out continuations and no values returned from jobs —
//! a job graph is a DAG of side effects, not a computation with results.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicUsize, Ordering};
use std::sync::OnceLock;

use tracing::{debug, instrument, trace};

use crate::arena::RegionArena;
use crate::constants::{MAX_REGIONS, REGION_CAPACITY, RESET_THRESHOLD};
use crate::cpu::pause;
use crate::error::{Result, SeakError};
use crate::pool::WorkerPool;
use crate::ring::mpmc;

/// The arena-resident record behind a [`JobHandle`]: a function pointer,
/// its opaque context, a predecessor counter, and at most one successor.
///
/// `unfinished` starts at 1 (self) and is incremented once per
/// predecessor linked via [`then`]/[`chain`].
struct JobRecord {
    func: Option<unsafe fn(*mut ())>,
    ctx: *mut (),
    unfinished: AtomicI64,
    continuation: AtomicPtr<JobRecord>,
}

// `JobRecord` is never actually `Default`-constructed with meaningful
// content outside the arena's lazy-clear path; real jobs are written in
// place by `spawn` via `RegionArena::slot_ptr`.
impl Default for JobRecord {
    fn default() -> Self {
        Self {
            func: None,
            ctx: std::ptr::null_mut(),
            unfinished: AtomicI64::new(0),
            continuation: AtomicPtr::new(std::ptr::null_mut()),
        }
    }
}

unsafe impl Send for JobRecord {}
unsafe impl Sync for JobRecord {}

/// A handle to a scheduled (or not-yet-scheduled) job.
///
/// Lightweight and `Copy`: it is a raw pointer into the scheduler's
/// arena, valid only within the arena's current epoch — a handle must
/// not be retained across a `reset()`.
#[derive(Clone, Copy)]
pub struct JobHandle {
    ptr: *mut JobRecord,
}

// The pointee is Send+Sync (see above); the handle itself crosses
// threads purely by value, same as any other pointer-shaped message
// passed through the dispatch ring.
unsafe impl Send for JobHandle {}
unsafe impl Sync for JobHandle {}

impl JobHandle {
    fn record(&self) -> &JobRecord {
        // Safety: valid for the arena epoch in which this handle was
        // produced; callers do not retain a `JobHandle` across a `reset()`.
        unsafe { &*self.ptr }
    }
}

struct Inner {
    arena: RegionArena<JobRecord>,
    accepting_jobs: AtomicBool,
    active_jobs: AtomicUsize,
    jobs_completed_epoch: AtomicUsize,
}

/// Process-wide scheduler state: the job arena plus the worker pool
/// draining its dispatch ring.
pub struct Scheduler {
    inner: Inner,
    pool: WorkerPool<JobHandle>,
}

static SCHEDULER: OnceLock<Scheduler> = OnceLock::new();

fn scheduler() -> &'static Scheduler {
    SCHEDULER
        .get()
        .expect("scheduler not initialized; call spawn_scheduler first")
}

/// The worker-pool body for the scheduler's dispatch ring. Pass this to
/// [`WorkerPool::new`] when building the pool to hand to
/// [`spawn_scheduler`] — the pool is constructed *before* the scheduler
/// singleton exists, so this function resolves the singleton lazily, on
/// each dequeue, rather than capturing it at construction time.
pub fn worker_entry(job: JobHandle, self_tx: &mpmc::Sender<JobHandle>) {
    worker_body(scheduler(), job, self_tx);
}

/// Initialize the process-wide scheduler singleton from an
/// already-constructed worker pool. `pool` must have been built with
/// [`worker_entry`] as its body, e.g.
/// `WorkerPool::<JobHandle>::new(n, seakutils::constants::MAX_JOBS, seakutils::scheduler::worker_entry)`.
///
/// Fails with [`SeakError::AlreadyInitialized`] if called more than once.
pub fn spawn_scheduler(pool: WorkerPool<JobHandle>) -> Result<()> {
    let inner = Inner {
        arena: RegionArena::create(REGION_CAPACITY, MAX_REGIONS)?,
        accepting_jobs: AtomicBool::new(true),
        active_jobs: AtomicUsize::new(0),
        jobs_completed_epoch: AtomicUsize::new(0),
    };
    SCHEDULER
        .set(Scheduler { inner, pool })
        .map_err(|_| SeakError::AlreadyInitialized)?;
    debug!("job scheduler initialized");
    Ok(())
}

/// Tear down the scheduler's worker pool. The singleton itself is not
/// reclaimed (there is no way to remove a value from a `OnceLock`); a
/// process that has shut the scheduler down is not expected to call
/// [`spawn_scheduler`] again.
pub fn shutdown_scheduler() {
    scheduler().pool.shutdown();
}

/// Allocate a new job from the scheduler's arena. Spins while admission
/// is closed for an in-progress epoch reset; returns `None` if the arena
/// could not produce a slot at this precise moment (the arena is
/// exhausted for the current epoch) — the caller is expected to retry.
///
/// The job is allocated but not yet scheduled — nothing happens to it
/// until it reaches the dispatch ring via [`then`], [`chain`]/
/// [`chain_arr`], or [`wait`].
#[instrument(skip(func, ctx))]
pub fn spawn(func: unsafe fn(*mut ()), ctx: *mut ()) -> Option<JobHandle> {
    let s = scheduler();
    while !s.inner.accepting_jobs.load(Ordering::Acquire) {
        pause();
    }
    s.inner.active_jobs.fetch_add(1, Ordering::AcqRel);
    let slot = match s.inner.arena.alloc() {
        Ok(slot) => slot,
        Err(_) => {
            s.inner.active_jobs.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
    };
    let ptr = s.inner.arena.slot_ptr(slot)?;
    unsafe {
        ptr.write(JobRecord {
            func: Some(func),
            ctx,
            unfinished: AtomicI64::new(1),
            continuation: AtomicPtr::new(std::ptr::null_mut()),
        });
    }
    Some(JobHandle { ptr })
}

/// Link `next` as `first`'s sole continuation, then enqueue `first` for
/// execution. `next.unfinished` is incremented before `first` is
/// enqueued, so `next` cannot become ready until `first` has released its
/// predecessor count.
pub fn then(first: JobHandle, next: JobHandle) {
    first.record().continuation.store(next.ptr, Ordering::Release);
    next.record().unfinished.fetch_add(1, Ordering::AcqRel);
    schedule(first);
}

/// Link `jobs[0] -> jobs[1] -> ... -> jobs[n-1]` as a single-successor
/// chain and enqueue `jobs[0]`. Each job in the chain must not already
/// carry a `continuation` from a prior `then` call — `chain` assumes no
/// prior `then` has touched an intermediate job.
pub fn chain(jobs: &[JobHandle]) {
    for pair in jobs.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        b.record().unfinished.fetch_add(1, Ordering::AcqRel);
        a.record().continuation.store(b.ptr, Ordering::Release);
    }
    if let Some(&first) = jobs.first() {
        schedule(first);
    }
}

/// Alias for [`chain`], for callers that think of linking a fixed array
/// of jobs as a distinct operation from a variadic one; a Rust slice
/// already covers both.
pub fn chain_arr(jobs: &[JobHandle]) {
    chain(jobs);
}

/// Submit `job` for execution. Despite the name (kept for parity with
/// spec.md §4.7), this does not block the caller — it is the scheduling
/// verb, identical to what [`then`]/[`chain`] do to their first job.
pub fn wait(job: JobHandle) {
    schedule(job);
}

/// Enqueue `job` into the dispatch ring unless it has already retired
/// (spec.md §4.7 `schedule`: "If the scheduled job's `unfinished == 0`,
/// skip").
fn schedule(job: JobHandle) {
    if job.record().unfinished.load(Ordering::Acquire) == 0 {
        return;
    }
    let s = scheduler();
    loop {
        match s.pool.execute(job) {
            Ok(()) => return,
            Err(SeakError::Closed) => {
                trace!("dropped schedule() after scheduler shutdown");
                return;
            }
            Err(_) => pause(),
        }
    }
}

/// The per-job worker body (spec.md §4.7 "Worker body", steps 1-7).
///
/// Step 6 (arena health check) and step 7 (decrement `active_jobs`) are
/// applied in the opposite order from the numbered list: decrementing
/// `active_jobs` for *this* job before checking whether to reset is the
/// only way the reset's drain spin (`active_jobs == 0`) can ever succeed
/// when this job itself is the last one running — taken literally, the
/// numbered order has the health check spin forever on its own
/// not-yet-released count. See DESIGN.md.
fn worker_body(s: &Scheduler, job: JobHandle, self_tx: &mpmc::Sender<JobHandle>) {
    let record = job.record();

    // Step 1: predecessors not yet all complete — drop. The last
    // predecessor to finish will re-enqueue this job (see `then`/`chain`
    // successor bump below).
    if record.unfinished.load(Ordering::Acquire) != 1 {
        return;
    }

    // Step 2.
    if let Some(func) = record.func {
        unsafe { func(record.ctx) };
    }

    // Step 3.
    s.inner.jobs_completed_epoch.fetch_add(1, Ordering::AcqRel);

    // Step 4: releases this job's own unit, now 0 (retired).
    record.unfinished.fetch_sub(1, Ordering::Release);

    // Step 5.
    let cont_ptr = record.continuation.load(Ordering::Acquire);
    let has_continuation = !cont_ptr.is_null();
    if has_continuation {
        let continuation = JobHandle { ptr: cont_ptr };
        let prev = continuation.record().unfinished.fetch_sub(1, Ordering::AcqRel);
        if prev - 1 == 1 {
            loop {
                match self_tx.try_send(continuation) {
                    Ok(()) => break,
                    Err(SeakError::Closed) => break,
                    Err(_) => pause(),
                }
            }
        }
    }

    // Step 7 (reordered ahead of step 6; see function doc comment).
    s.inner.active_jobs.fetch_sub(1, Ordering::AcqRel);

    // Step 6: only when there is no continuation to hand off to.
    if !has_continuation {
        maybe_reset_epoch(s);
    }
}

/// Arena health check and epoch reset (spec.md §4.7).
fn maybe_reset_epoch(s: &Scheduler) {
    if s.inner.jobs_completed_epoch.load(Ordering::Acquire) <= RESET_THRESHOLD {
        return;
    }
    s.inner.accepting_jobs.store(false, Ordering::Release);
    while s.inner.active_jobs.load(Ordering::Acquire) != 0 {
        pause();
    }
    s.inner.arena.reset();
    let completed = s.inner.jobs_completed_epoch.swap(0, Ordering::AcqRel);
    s.inner.accepting_jobs.store(true, Ordering::Release);
    debug!(completed, "scheduler epoch reset");
}
