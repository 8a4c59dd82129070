//! Single-producer/multi-consumer bounded ring.
//!
//! One producer publishes via the plain sequence discipline; any number
//! of consumers race a shared `tail` cursor with `fetch_add` to claim a
//! slot, then block-spin on that slot's `seq` until the producer has
//! actually written it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cpu::CachePadded;
use crate::error::{Result, SeakError};
use crate::ring::common::{EndpointCount, RingState};
use crate::ring::seq::{self, Slot};

struct Inner<T> {
    slots: Box<[Slot<T>]>,
    capacity: u64,
    head: CachePadded<AtomicU64>, // single producer, advanced without CAS
    tail: CachePadded<AtomicU64>, // shared among consumers, advanced with fetch_add
    state: RingState,
    consumers: EndpointCount,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// Create an SPMC ring of the given fixed capacity.
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
        consumers: EndpointCount::new(),
    });
    let rx = Receiver { inner: inner.clone() };
    rx.inner.consumers.inc();
    Ok((Sender { inner }, rx))
}

/// The sole producer handle of an SPMC ring.
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

/// One of possibly several consumer handles of an SPMC ring.
///
/// Cloning a `Receiver` registers a new consumer; dropping one
/// deregisters it. Unlike SPSC's single fixed pair of handles,
/// "multi-consumer" means the topology must support more than one live
/// `Receiver` at a time by construction.
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
    /// Attempt to enqueue `value` without blocking on ring fullness;
    /// still spins briefly if the target slot has not yet been fully
    /// recycled by its last reader.
    pub fn try_send(&self, value: T) -> Result<()> {
        if self.inner.state.is_closed() {
            return Err(SeakError::Closed);
        }
        let head = self.inner.head.load(Ordering::Relaxed);
        let tail = self.inner.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) == self.inner.capacity {
            return Err(SeakError::Full);
        }
        let is_closed = || self.inner.state.is_closed();
        unsafe {
            seq::produce_at(&self.inner.slots, self.inner.capacity, head, is_closed, value)?;
        }
        self.inner.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Close the ring so blocked consumers wake with `Closed` once drained.
    pub fn close(&self) {
        self.inner.state.close();
    }
}

impl<T> Receiver<T> {
    /// Claim the next slot and block-spin until the producer has
    /// published it, or the ring closes with nothing left to drain.
    pub fn recv(&self) -> Result<T> {
        let c = self.inner.tail.fetch_add(1, Ordering::AcqRel);
        let is_closed = || self.inner.state.is_closed();
        unsafe { seq::consume_blocking_at(&self.inner.slots, self.inner.capacity, c, is_closed) }
    }

    /// Number of currently registered consumer handles.
    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.get()
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Every Sender/Receiver is gone by the time `Inner` drops, so no
        // `produce_at`/`consume_blocking_at` call can still be in flight:
        // every cursor in `[tail, head)` is fully published, never
        // mid-write.
        let tail = *self.tail.get_mut();
        let head = *self.head.get_mut();
        unsafe {
            seq::drop_unconsumed(&self.slots, self.capacity, tail, head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;
    use std::thread;

    #[test]
    fn single_consumer_round_trip() {
        let (tx, rx) = create::<u64>(8).unwrap();
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);
    }

    #[test]
    fn dropping_the_ring_drops_unconsumed_elements() {
        struct DropCounter(Arc<StdAtomicU64>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(StdAtomicU64::new(0));
        {
            let (tx, rx) = create::<DropCounter>(8).unwrap();
            tx.try_send(DropCounter(drops.clone())).unwrap();
            tx.try_send(DropCounter(drops.clone())).unwrap();
            tx.try_send(DropCounter(drops.clone())).unwrap();
            assert!(rx.recv().is_ok()); // consume one, leave two resident
            drop(tx);
            drop(rx);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn fan_out_to_many_consumers_delivers_each_item_once() {
        let (tx, rx0) = create::<u64>(64).unwrap();
        let total = 10_000u64;
        let n_consumers = 4;

        let receivers: Vec<_> = (0..n_consumers).map(|_| rx0.clone()).collect();
        drop(rx0);

        let producer = thread::spawn(move || {
            for i in 0..total {
                loop {
                    if tx.try_send(i).is_ok() {
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
            tx.close();
        });

        let sum = Arc::new(StdAtomicU64::new(0));
        let count = Arc::new(StdAtomicU64::new(0));
        let handles: Vec<_> = receivers
            .into_iter()
            .map(|rx| {
                let sum = sum.clone();
                let count = count.clone();
                thread::spawn(move || loop {
                    match rx.recv() {
                        Ok(v) => {
                            sum.fetch_add(v, Ordering::Relaxed);
                            count.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(SeakError::Closed) => break,
                        Err(e) => panic!("unexpected error: {e:?}"),
                    }
                })
            })
            .collect();

        producer.join().unwrap();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(count.load(Ordering::Relaxed), total);
        assert_eq!(sum.load(Ordering::Relaxed), total * (total - 1) / 2);
    }
}
