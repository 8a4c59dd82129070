//! Shared ring lifecycle state: the `Open|Closed` flag and the
//! endpoint-count bookkeeping used by topologies that need a drain
//! barrier before their storage is freed.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::cpu::pause;

const OPEN: u8 = 0;
const CLOSED: u8 = 1;

/// The ring-wide `{Open, Closed}` state.
///
/// Closing is sticky: once `Closed`, a ring never reopens.
pub(crate) struct RingState(AtomicU8);

impl RingState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(OPEN))
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire) == CLOSED
    }

    #[inline]
    pub(crate) fn close(&self) {
        self.0.store(CLOSED, Ordering::Release);
    }
}

/// Count of live endpoint handles of one role (producers or consumers).
///
/// Destruction spins until the counts it cares about reach zero before
/// freeing slot storage.
pub(crate) struct EndpointCount(AtomicUsize);

impl EndpointCount {
    pub(crate) fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    #[inline]
    pub(crate) fn inc(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn dec(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Busy-wait until every handle of this role has closed.
    pub(crate) fn wait_for_zero(&self) {
        while self.get() != 0 {
            pause();
        }
    }
}
