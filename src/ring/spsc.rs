//! Single-producer/single-consumer bounded ring.
//!
//! No per-slot metadata: occupancy is derived purely from `head - tail`.
//! No endpoint tracking — SPSC has exactly one producer and one consumer
//! by construction, so destruction is just "free storage once the sole
//! handles are gone", which in Rust is exactly what dropping the last
//! handle gives us for free.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cpu::CachePadded;
use crate::error::{Result, SeakError};
use crate::ring::common::RingState;

struct Inner<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: u64,
    head: CachePadded<AtomicU64>, // producer cursor
    tail: CachePadded<AtomicU64>, // consumer cursor
    state: RingState,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn idx(&self, cursor: u64) -> usize {
        (cursor % self.capacity) as usize
    }
}

/// Create an SPSC ring of the given fixed capacity.
pub fn create<T>(capacity: usize) -> Result<(Sender<T>, Receiver<T>)> {
    if capacity == 0 {
        return Err(SeakError::AllocFailure);
    }
    let buf = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect();
    let inner = Arc::new(Inner {
        buf,
        capacity: capacity as u64,
        head: CachePadded::new(AtomicU64::new(0)),
        tail: CachePadded::new(AtomicU64::new(0)),
        state: RingState::new(),
    });
    Ok((
        Sender { inner: inner.clone() },
        Receiver { inner },
    ))
}

/// The sole producer handle of an SPSC ring.
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

/// The sole consumer handle of an SPSC ring.
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Sender<T> {
    /// Attempt to enqueue `value` without blocking.
    ///
    /// Producer ordering: load `tail` with acquire, store `head` with
    /// release.
    pub fn try_send(&self, value: T) -> Result<()> {
        if self.inner.state.is_closed() {
            return Err(SeakError::Closed);
        }
        let head = self.inner.head.load(Ordering::Relaxed);
        let tail = self.inner.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) == self.inner.capacity {
            return Err(SeakError::Full);
        }
        let idx = self.inner.idx(head);
        unsafe {
            (*self.inner.buf[idx].get()).write(value);
        }
        self.inner.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Close the ring. Sticky; the consumer may keep draining until empty.
    pub fn close(&self) {
        self.inner.state.close();
    }

    /// Whether the ring has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }
}

impl<T> Receiver<T> {
    /// Attempt to dequeue a value without blocking.
    ///
    /// Consumer ordering: load `head` with acquire, store `tail` with
    /// release. Draining past `close()` is allowed: this only checks
    /// emptiness, never the closed flag.
    pub fn recv(&self, out: &mut Option<T>) -> Result<()> {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let head = self.inner.head.load(Ordering::Acquire);
        if head == tail {
            return Err(SeakError::Empty);
        }
        let idx = self.inner.idx(tail);
        let value = unsafe { (*self.inner.buf[idx].get()).assume_init_read() };
        self.inner.tail.store(tail.wrapping_add(1), Ordering::Release);
        *out = Some(value);
        Ok(())
    }

    /// Whether the ring's producer side has closed.
    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Drop any values still resident between tail and head.
        let tail = *self.tail.get_mut();
        let head = *self.head.get_mut();
        let mut cursor = tail;
        while cursor != head {
            let idx = (cursor % self.capacity) as usize;
            unsafe {
                std::ptr::drop_in_place(self.buf[idx].get_mut().as_mut_ptr());
            }
            cursor = cursor.wrapping_add(1);
        }
    }
}
