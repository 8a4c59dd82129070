//! Multi-producer/single-consumer bounded ring.
//!
//! Producers race a shared `head` cursor with `fetch_add`, then spin on
//! the claimed slot's `seq` until it is theirs to write. The lone
//! consumer never blocks: an unready slot is reported as `Empty`
//! immediately rather than spun on, since there is nothing else for a
//! single consumer to usefully wait for beyond "try again later".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cpu::CachePadded;
use crate::error::{Result, SeakError};
use crate::ring::common::{EndpointCount, RingState};
use crate::ring::seq::{self, Slot};

struct Inner<T> {
    slots: Box<[Slot<T>]>,
    capacity: u64,
    head: CachePadded<AtomicU64>, // shared among producers, advanced with fetch_add
    tail: CachePadded<AtomicU64>, // single consumer, advanced without CAS
    state: RingState,
    producers: EndpointCount,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// Create an MPSC ring of the given fixed capacity.
pub fn create<T>(capacity: usize) -> Result<(Sender<T>, Receiver<T>)> {
    if capacity == 0 {
        return Err(SeakError::AllocFailure);
    }
    let inner = Arc::new(Inner {
        slots: seq::new_slots(capacity),
        capacity: capacity as u64,
        head: CachePadded::new(AtomicU64::new(0)),
        tail: CachePadded::new(AtomicU64::new(0)),
        state: RingState::new(),
        producers: EndpointCount::new(),
    });
    let tx = Sender { inner: inner.clone() };
    tx.inner.producers.inc();
    Ok((tx, Receiver { inner }))
}

/// One of possibly several producer handles of an MPSC ring.
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.inner.producers.inc();
        Self { inner: self.inner.clone() }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.inner.producers.dec();
    }
}

/// The sole consumer handle of an MPSC ring.
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Sender<T> {
    /// Claim the next slot and spin until it can be written, or the ring
    /// closes while waiting. This is the contended (multi-producer) side
    /// of the ring, so — as with SPMC's contended `Receiver::recv` — it
    /// has no non-blocking `try_send` counterpart: a producer that claims
    /// a slot via `fetch_add` must wait for that exact slot to free up,
    /// there is no way to "peek" a slot already claimed by a winning
    /// `fetch_add` and back off instead.
    pub fn send(&self, value: T) -> Result<()> {
        if self.inner.state.is_closed() {
            return Err(SeakError::Closed);
        }
        let p = self.inner.head.fetch_add(1, Ordering::AcqRel);
        let is_closed = || self.inner.state.is_closed();
        unsafe { seq::produce_at(&self.inner.slots, self.inner.capacity, p, is_closed, value) }
    }

    /// Close the ring. Sticky; the consumer may keep draining until empty.
    pub fn close(&self) {
        self.inner.state.close();
    }

    /// Number of currently registered producer handles.
    pub fn producer_count(&self) -> usize {
        self.inner.producers.get()
    }
}

impl<T> Receiver<T> {
    /// Attempt to dequeue without blocking. Returns `Empty` if the next
    /// slot has not yet been published by its producer.
    pub fn recv(&self) -> Result<T> {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let value = unsafe { seq::try_consume_at(&self.inner.slots, self.inner.capacity, tail)? };
        self.inner.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
        Ok(value)
    }

    /// Whether every producer handle has dropped or closed the ring.
    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed() || self.inner.producers.get() == 0
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Every Sender/Receiver is gone by the time `Inner` drops, so no
        // `produce_at`/`try_consume_at` call can still be in flight:
        // every cursor in `[tail, head)` is fully published, never
        // mid-write.
        let tail = *self.tail.get_mut();
        let head = *self.head.get_mut();
        unsafe {
            seq::drop_unconsumed(&self.slots, self.capacity, tail, head);
        }
    }
}
