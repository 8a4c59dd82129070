//! The per-slot sequence discipline shared by SPMC, MPSC and MPMC rings:
//! each slot carries an atomic `seq` that encodes whether it is
//! producible, readable, or being recycled, which is the sole
//! synchronizer between concurrent producers and/or consumers.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cpu::pause;
use crate::error::{Result, SeakError};

/// One ring slot: an atomic sequence number plus its (possibly
/// uninitialized) payload.
pub(crate) struct Slot<T> {
    seq: AtomicU64,
    data: UnsafeCell<MaybeUninit<T>>,
}

unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

/// Allocate `capacity` slots, each seeded with `seq == its own index`.
pub(crate) fn new_slots<T>(capacity: usize) -> Box<[Slot<T>]> {
    (0..capacity)
        .map(|i| Slot {
            seq: AtomicU64::new(i as u64),
            data: UnsafeCell::new(MaybeUninit::uninit()),
        })
        .collect()
}

/// Drop every element still resident in `[tail, head)`, i.e. every
/// message a producer published but no consumer ever read.
///
/// Called only from a ring's `Inner::drop`, by which point every
/// `Sender`/`Receiver` handle has already gone out of scope — no
/// `produce_at`/`consume_*_at` call can still be in flight, so every
/// cursor in `[tail, head)` is guaranteed fully published
/// (`seq == cursor + 1`) rather than mid-write.
///
/// # Safety
/// Caller must have exclusive access to `slots` (no other references
/// live) and `tail`/`head` must be this ring's final cursor values.
pub(crate) unsafe fn drop_unconsumed<T>(slots: &[Slot<T>], capacity: u64, tail: u64, head: u64) {
    let mut cursor = tail;
    while cursor != head {
        let idx = (cursor % capacity) as usize;
        std::ptr::drop_in_place(slots[idx].data.get().cast::<T>());
        cursor = cursor.wrapping_add(1);
    }
}

/// Produce `value` at cursor `p`. Spins until the slot becomes writable
/// (`seq == p`), polling `is_closed` between attempts, then publishes
/// `seq := p + 1`.
///
/// # Safety
/// Caller must ensure no other producer is concurrently writing the
/// same slot index without having first observed `seq == p` itself
/// (guaranteed by the `fetch_add`/relaxed-cursor protocol in the callers
/// of this function).
pub(crate) unsafe fn produce_at<T>(
    slots: &[Slot<T>],
    capacity: u64,
    p: u64,
    is_closed: impl Fn() -> bool,
    value: T,
) -> Result<()> {
    let slot = &slots[(p % capacity) as usize];
    loop {
        if slot.seq.load(Ordering::Acquire) == p {
            break;
        }
        if is_closed() {
            return Err(SeakError::Closed);
        }
        pause();
    }
    (*slot.data.get()).write(value);
    slot.seq.store(p.wrapping_add(1), Ordering::Release);
    Ok(())
}

/// Consume at cursor `c` on a blocking (SPMC/MPMC) consumer. Spins until
/// the slot becomes readable (`seq == c + 1`), then publishes
/// `seq := c + capacity`, freeing the slot for the next wrap.
///
/// # Safety
/// Caller must have already claimed `c` exclusively (e.g. via
/// `fetch_add` on a shared tail cursor).
pub(crate) unsafe fn consume_blocking_at<T>(
    slots: &[Slot<T>],
    capacity: u64,
    c: u64,
    is_closed: impl Fn() -> bool,
) -> Result<T> {
    let slot = &slots[(c % capacity) as usize];
    let ready = c.wrapping_add(1);
    loop {
        if slot.seq.load(Ordering::Acquire) == ready {
            break;
        }
        if is_closed() {
            return Err(SeakError::Closed);
        }
        pause();
    }
    let value = (*slot.data.get()).assume_init_read();
    slot.seq.store(c.wrapping_add(capacity), Ordering::Release);
    Ok(value)
}

/// Non-blocking consume for the single-consumer (MPSC) discipline: never
/// spins, returns `Empty` immediately if the slot has not yet been
/// published by its producer.
///
/// # Safety
/// Caller is the sole consumer and has exclusive access to `tail`.
pub(crate) unsafe fn try_consume_at<T>(slots: &[Slot<T>], capacity: u64, tail: u64) -> Result<T> {
    let slot = &slots[(tail % capacity) as usize];
    let ready = tail.wrapping_add(1);
    if slot.seq.load(Ordering::Acquire) != ready {
        return Err(SeakError::Empty);
    }
    let value = (*slot.data.get()).assume_init_read();
    slot.seq.store(tail.wrapping_add(capacity), Ordering::Release);
    Ok(value)
}

/// Non-blocking produce against a cursor shared by multiple producers:
/// peek the target slot's `seq` before claiming it with a
/// `compare_exchange`, so a producer never claims a slot it would then
/// have to spin on. Returns `Full` immediately if the next slot has not
/// been freed by its last reader yet, rather than waiting for it.
///
/// This is the classic Vyukov bounded-queue claim, used where
/// `produce_at`'s unconditional `fetch_add`-then-spin claim is the wrong
/// tradeoff (e.g. a caller that would rather back off than block).
pub(crate) fn try_produce_at<T>(
    slots: &[Slot<T>],
    capacity: u64,
    cursor: &AtomicU64,
    is_closed: impl Fn() -> bool,
    value: T,
) -> Result<()> {
    let mut value = Some(value);
    let mut pos = cursor.load(Ordering::Relaxed);
    loop {
        if is_closed() {
            return Err(SeakError::Closed);
        }
        let slot = &slots[(pos % capacity) as usize];
        let seq = slot.seq.load(Ordering::Acquire);
        let diff = seq as i64 - pos as i64;
        if diff == 0 {
            if cursor
                .compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                unsafe { (*slot.data.get()).write(value.take().expect("written exactly once")) };
                slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                return Ok(());
            }
            pos = cursor.load(Ordering::Relaxed);
        } else if diff < 0 {
            return Err(SeakError::Full);
        } else {
            pos = cursor.load(Ordering::Relaxed);
        }
    }
}

/// Non-blocking consume against a cursor shared by multiple consumers:
/// the multi-consumer counterpart to `try_consume_at`. Peeks the target
/// slot before claiming it, so an empty ring is reported as `Empty`
/// immediately instead of spinning a claimed-but-unpublished slot.
pub(crate) fn try_consume_multi_at<T>(
    slots: &[Slot<T>],
    capacity: u64,
    cursor: &AtomicU64,
    is_closed: impl Fn() -> bool,
) -> Result<T> {
    let mut pos = cursor.load(Ordering::Relaxed);
    loop {
        let slot = &slots[(pos % capacity) as usize];
        let ready = pos.wrapping_add(1);
        let seq = slot.seq.load(Ordering::Acquire);
        let diff = seq as i64 - ready as i64;
        if diff == 0 {
            if cursor
                .compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let value = unsafe { (*slot.data.get()).assume_init_read() };
                slot.seq.store(pos.wrapping_add(capacity), Ordering::Release);
                return Ok(value);
            }
            pos = cursor.load(Ordering::Relaxed);
        } else if diff < 0 {
            if is_closed() {
                return Err(SeakError::Closed);
            }
            return Err(SeakError::Empty);
        } else {
            pos = cursor.load(Ordering::Relaxed);
        }
    }
}
