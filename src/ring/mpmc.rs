//! Multi-producer/multi-consumer bounded ring.
//!
//! `send`/`recv` share cursors advanced with `fetch_add`; both sides
//! block-spin on the claimed slot's `seq` since the claim alone does not
//! guarantee the data is there yet. `try_send`/`try_recv` claim the same
//! cursors instead with a peek-then-`compare_exchange`, so they report
//! `Full`/`Empty` immediately rather than waiting. Destruction waits for
//! both producer and consumer endpoint counts to reach zero before
//! storage is freed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cpu::CachePadded;
use crate::error::{Result, SeakError};
use crate::ring::common::{EndpointCount, RingState};
use crate::ring::seq::{self, Slot};

struct Inner<T> {
    slots: Box<[Slot<T>]>,
    capacity: u64,
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    state: RingState,
    producers: EndpointCount,
    consumers: EndpointCount,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// Create an MPMC ring of the given fixed capacity.
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
        consumers: EndpointCount::new(),
    });
    let tx = Sender { inner: inner.clone() };
    tx.inner.producers.inc();
    let rx = Receiver { inner };
    rx.inner.consumers.inc();
    Ok((tx, rx))
}

/// One of possibly several producer handles of an MPMC ring.
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

/// One of possibly several consumer handles of an MPMC ring.
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.inner.consumers.inc();
        Self { inner: self.inner.clone() }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.inner.consumers.dec();
    }
}

impl<T> Sender<T> {
    /// Claim a slot and spin until the previous occupant has been fully
    /// consumed, or the ring is already closed.
    pub fn send(&self, value: T) -> Result<()> {
        if self.inner.state.is_closed() {
            return Err(SeakError::Closed);
        }
        let p = self.inner.head.fetch_add(1, Ordering::AcqRel);
        let is_closed = || self.inner.state.is_closed();
        unsafe { seq::produce_at(&self.inner.slots, self.inner.capacity, p, is_closed, value) }
    }

    /// Claim a slot without waiting for it to free up: returns `Full`
    /// immediately instead of spinning on a not-yet-recycled slot.
    pub fn try_send(&self, value: T) -> Result<()> {
        if self.inner.state.is_closed() {
            return Err(SeakError::Closed);
        }
        let is_closed = || self.inner.state.is_closed();
        seq::try_produce_at(&self.inner.slots, self.inner.capacity, &self.inner.head, is_closed, value)
    }

    /// Close the ring so blocked consumers wake with `Closed` once drained.
    pub fn close(&self) {
        self.inner.state.close();
    }

    /// Number of currently registered producer handles.
    pub fn producer_count(&self) -> usize {
        self.inner.producers.get()
    }
}

impl<T> Receiver<T> {
    /// Claim a slot and block-spin until its producer has published it,
    /// or the ring closes with that slot never produced.
    pub fn recv(&self) -> Result<T> {
        let c = self.inner.tail.fetch_add(1, Ordering::AcqRel);
        let is_closed = || self.inner.state.is_closed();
        unsafe { seq::consume_blocking_at(&self.inner.slots, self.inner.capacity, c, is_closed) }
    }

    /// Claim a slot without waiting for its producer: returns `Empty`
    /// immediately instead of spinning on an unpublished slot.
    pub fn try_recv(&self) -> Result<T> {
        let is_closed = || self.inner.state.is_closed();
        seq::try_consume_multi_at(&self.inner.slots, self.inner.capacity, &self.inner.tail, is_closed)
    }

    /// Number of currently registered consumer handles.
    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.get()
    }

    /// Consume this handle and busy-wait until every producer and
    /// consumer handle of the ring — including this one — has closed.
    /// Rust's `Arc` already guarantees storage outlives every live
    /// handle, so there is nothing left to free explicitly once this
    /// returns; the wait itself is the useful part, e.g. for a caller
    /// that wants to block until the ring is fully quiescent before
    /// reusing whatever the ring was feeding.
    ///
    /// Takes `self` by value rather than `&self`: a borrowed handle would
    /// still count itself as live in `consumers`, and the endpoint count
    /// this function waits on could then never reach zero.
    pub fn wait_for_drain(self) {
        let inner = self.inner.clone();
        drop(self);
        inner.producers.wait_for_zero();
        inner.consumers.wait_for_zero();
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Every Sender/Receiver is gone by the time `Inner` drops, so no
        // `produce_at`/`consume_blocking_at`/`try_produce_at`/
        // `try_consume_multi_at` call can still be in flight: every
        // cursor in `[tail, head)` is fully published, never mid-write.
        let tail = *self.tail.get_mut();
        let head = *self.head.get_mut();
        unsafe {
            seq::drop_unconsumed(&self.slots, self.capacity, tail, head);
        }
    }
}
