//! Epoch-reset segmented bump allocator.
//!
//! A sparse array of up to `max_regions` region descriptors, each owning
//! `region_capacity` elements. Allocation bumps a single global counter;
//! `reset` is O(1) because region storage is only actually cleared lazily,
//! the first time a new epoch touches a region left over from an older
//! one.

use std::cell::UnsafeCell;
use std::process;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use tracing::{debug, error};

use crate::cpu::pause;
use crate::error::Result;

/// Sentinel epoch value a region's descriptor briefly holds while one
/// racing allocator is physically zeroing it, so no other caller can
/// observe the target epoch (and start writing) before clearing finishes.
const CLEARING: u64 = u64::MAX;

struct Region<T> {
    epoch: AtomicU64,
    slots: Box<[UnsafeCell<T>]>,
}

unsafe impl<T: Send> Send for Region<T> {}
unsafe impl<T: Send> Sync for Region<T> {}

impl<T: Default> Region<T> {
    fn new(capacity: usize, epoch: u64) -> Box<Self> {
        let slots = (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
        Box::new(Self { epoch: AtomicU64::new(epoch), slots })
    }

    /// Lazily clear this region's storage the first time it is touched
    /// under a new epoch, then stamp it with that epoch.
    fn ensure_epoch(&self, epoch: u64) {
        loop {
            let observed = self.epoch.load(Ordering::Acquire);
            if observed == epoch {
                return;
            }
            if observed == CLEARING {
                // Another thread is already zeroing this region; back off
                // and re-observe rather than racing a second CAS against
                // the sentinel (which would trivially succeed and let two
                // threads write through the same `UnsafeCell` at once).
                pause();
                continue;
            }
            if self
                .epoch
                .compare_exchange(observed, CLEARING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                for slot in self.slots.iter() {
                    unsafe {
                        *slot.get() = T::default();
                    }
                }
                self.epoch.store(epoch, Ordering::Release);
                return;
            }
            pause();
        }
    }
}

/// A fixed-capacity, epoch-reset region arena over elements of type `T`.
///
/// `T: Default` is the only bound the arena's allocation path needs — a
/// region's contents are reused wholesale across epochs (reset to
/// `T::default()` lazily on first touch), never freed element by
/// element. The convenience value-copying accessors (`add`, `get`,
/// `get_last`) additionally require `Copy`; scheduler-style callers that
/// need in-place mutation of a non-`Copy` element (an atomic counter, a
/// pointer field) go through [`RegionArena::slot_ptr`] instead.
pub struct RegionArena<T> {
    regions: Box<[AtomicPtr<Region<T>>]>,
    region_capacity: usize,
    max_regions: usize,
    count: AtomicUsize,
    regions_in_use: AtomicUsize,
    current_epoch: AtomicU64,
}

unsafe impl<T: Send> Send for RegionArena<T> {}
unsafe impl<T: Send> Sync for RegionArena<T> {}

impl<T: Default> RegionArena<T> {
    /// Create an arena with `region_capacity` elements per region and up
    /// to `max_regions` regions (`0` defaults to
    /// [`crate::constants::MAX_REGIONS`]). Region 0 is allocated eagerly.
    ///
    /// Returns `Err(SeakError::CapacityExceeded)` if `max_regions` exceeds
    /// [`crate::constants::ABSOLUTE_MAX_REGIONS`] — a request-time bound,
    /// distinct from the `process::abort()` in [`Self::ensure_region`],
    /// which instead fires when an *already-constructed* arena runs into
    /// the `max_regions` the caller gave it.
    pub fn create(region_capacity: usize, max_regions: usize) -> Result<Self> {
        if region_capacity == 0 {
            return Err(crate::error::SeakError::AllocFailure);
        }
        let max_regions = if max_regions == 0 {
            crate::constants::MAX_REGIONS
        } else {
            max_regions
        };
        if max_regions > crate::constants::ABSOLUTE_MAX_REGIONS {
            return Err(crate::error::SeakError::CapacityExceeded {
                requested: max_regions,
                max: crate::constants::ABSOLUTE_MAX_REGIONS,
            });
        }
        let regions = (0..max_regions)
            .map(|_| AtomicPtr::new(std::ptr::null_mut()))
            .collect();
        let arena = Self {
            regions,
            region_capacity,
            max_regions,
            count: AtomicUsize::new(0),
            regions_in_use: AtomicUsize::new(0),
            current_epoch: AtomicU64::new(0),
        };
        arena.ensure_region(0)?;
        Ok(arena)
    }

    /// Guarantee region `r` exists (allocating it if necessary) and is
    /// stamped with the current epoch. Aborts the process if `r` exceeds
    /// `max_regions` — a hard fail-fast limit, not a recoverable error.
    fn ensure_region(&self, r: usize) -> Result<()> {
        if r >= self.max_regions {
            error!(region = r, max_regions = self.max_regions, "region arena capacity exceeded");
            process::abort();
        }
        loop {
            let ptr = self.regions[r].load(Ordering::Acquire);
            if !ptr.is_null() {
                let epoch = self.current_epoch.load(Ordering::Acquire);
                unsafe { &*ptr }.ensure_epoch(epoch);
                return Ok(());
            }
            let epoch = self.current_epoch.load(Ordering::Acquire);
            let candidate = Box::into_raw(Region::new(self.region_capacity, epoch));
            match self.regions[r].compare_exchange(
                std::ptr::null_mut(),
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.regions_in_use.fetch_max(r + 1, Ordering::AcqRel);
                    return Ok(());
                }
                Err(_) => {
                    unsafe {
                        drop(Box::from_raw(candidate));
                    }
                    pause();
                }
            }
        }
    }

    /// Reserve the next slot, returning its arena-wide index.
    pub fn alloc(&self) -> Result<usize> {
        let slot = self.count.fetch_add(1, Ordering::AcqRel);
        let region = slot / self.region_capacity;
        self.ensure_region(region)?;
        Ok(slot)
    }

    /// Raw pointer to the storage backing an already-allocated `slot`, or
    /// `None` if `slot` lies outside the elements allocated in the
    /// current epoch. The sole escape hatch for callers whose element
    /// type is not `Copy` (the job scheduler's `JobRecord`, which holds
    /// atomics): they allocate via [`RegionArena::alloc`] then initialize
    /// and later mutate in place through this pointer instead of a
    /// value-copying `get`/`add`.
    ///
    /// # Safety
    /// The caller must not let the returned pointer outlive the current
    /// epoch (see [`RegionArena::reset`]) and must synchronize its own
    /// reads/writes through it — the arena itself only guarantees the
    /// slot exists and is stamped with the current epoch.
    pub fn slot_ptr(&self, slot: usize) -> Option<*mut T> {
        if slot >= self.count.load(Ordering::Acquire) {
            return None;
        }
        let region = slot / self.region_capacity;
        let offset = slot % self.region_capacity;
        let ptr = self.regions[region].load(Ordering::Acquire);
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { (*ptr).slots[offset].get() })
    }

    /// The epoch a given region is currently stamped with, or `None` if
    /// the region has never been touched. Lets a caller detect that a
    /// slot index it holds predates a `reset()` without dereferencing
    /// data the reset has invalidated.
    pub fn region_epoch(&self, region: usize) -> Option<u64> {
        if region >= self.max_regions {
            return None;
        }
        let ptr = self.regions[region].load(Ordering::Acquire);
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { &*ptr }.epoch.load(Ordering::Acquire))
    }

    /// The arena index a given slot's region would have to be bumped
    /// through — exposed so callers can translate a slot to a region for
    /// use with [`RegionArena::region_epoch`].
    pub fn region_of(&self, slot: usize) -> usize {
        slot / self.region_capacity
    }

    /// The epoch that will be stamped on the next region allocated or
    /// cleared.
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Acquire)
    }

    /// The high-water mark of regions ever brought into existence by
    /// `ensure_region`, i.e. one past the highest region index any slot
    /// has been allocated into so far. Unlike `current_epoch`, this never
    /// decreases — a region allocated once is never deallocated short of
    /// dropping the whole arena, even across `reset()`.
    pub fn regions_in_use(&self) -> usize {
        self.regions_in_use.load(Ordering::Acquire)
    }

    /// Invalidate every previously returned slot in O(1) by bumping the
    /// epoch counter and resetting the allocation cursor. Region storage
    /// is cleared lazily, on the next `alloc`/`add` that touches it.
    pub fn reset(&self) {
        let epoch = self.current_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.count.store(0, Ordering::Release);
        debug!(epoch, "region arena reset");
    }

    /// Free all region storage. Equivalent to dropping the arena; kept
    /// as an explicit call for callers that want the teardown to read as
    /// a statement rather than a scope exit.
    pub fn free(self) {}
}

impl<T: Copy + Default> RegionArena<T> {
    /// Reserve the next slot and write `value` into it.
    pub fn add(&self, value: T) -> Result<usize> {
        let slot = self.alloc()?;
        let ptr = self.slot_ptr(slot).expect("slot just allocated must exist");
        unsafe {
            *ptr = value;
        }
        Ok(slot)
    }

    /// Read the element at `slot`, or `None` if it lies outside the
    /// elements allocated in the current epoch.
    pub fn get(&self, slot: usize) -> Option<T> {
        self.slot_ptr(slot).map(|ptr| unsafe { *ptr })
    }

    /// Read the most recently allocated element, if any.
    pub fn get_last(&self) -> Option<T> {
        let count = self.count.load(Ordering::Acquire);
        if count == 0 {
            return None;
        }
        self.get(count - 1)
    }
}

impl<T> Drop for RegionArena<T> {
    fn drop(&mut self) {
        for slot in self.regions.iter() {
            let ptr = slot.swap(std::ptr::null_mut(), Ordering::AcqRel);
            if !ptr.is_null() {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequential_slots() {
        let arena = RegionArena::<u64>::create(4, 2).unwrap();
        let a = arena.add(10).unwrap();
        let b = arena.add(20).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(arena.get(a), Some(10));
        assert_eq!(arena.get(b), Some(20));
        assert_eq!(arena.get_last(), Some(20));
    }

    #[test]
    fn exceeding_max_regions_is_reported_before_the_abort_path() {
        // The abort-only slot (index >= max_regions) is exercised by
        // construction, not in-process: a single region filled exactly
        // to capacity must not itself trigger the hard limit.
        let arena = RegionArena::<u64>::create(2, 1).unwrap();
        arena.add(1).unwrap();
        arena.add(2).unwrap();
        assert_eq!(arena.region_of(1), 0);
    }

    #[test]
    fn create_rejects_max_regions_past_the_absolute_ceiling() {
        let requested = crate::constants::ABSOLUTE_MAX_REGIONS + 1;
        let err = RegionArena::<u64>::create(4, requested).unwrap_err();
        assert_eq!(
            err,
            crate::error::SeakError::CapacityExceeded {
                requested,
                max: crate::constants::ABSOLUTE_MAX_REGIONS,
            }
        );
    }

    #[test]
    fn regions_in_use_tracks_the_high_water_mark() {
        let arena = RegionArena::<u64>::create(4, 4).unwrap();
        assert_eq!(arena.regions_in_use(), 1);

        for i in 0..8u64 {
            arena.add(i).unwrap();
        }
        assert_eq!(arena.regions_in_use(), 2);

        // A reset rewinds the allocation cursor but does not shrink the
        // set of regions already brought into existence.
        arena.reset();
        assert_eq!(arena.regions_in_use(), 2);
    }

    #[test]
    fn epoch_reuse_zeroes_region_on_first_touch() {
        // E=8 (as u64 here), R=4, M=2.
        let arena = RegionArena::<u64>::create(4, 2).unwrap();
        for i in 0..8u64 {
            arena.add(i).unwrap();
        }
        arena.reset();

        let slot = arena.add(99).unwrap();
        assert_eq!(arena.region_of(slot), 0);
        assert_eq!(arena.get(slot), Some(99));

        for _ in 0..3 {
            arena.add(1).unwrap();
        }
        // Ninth allocation across both epochs lands in region 1.
        let ninth = arena.add(7).unwrap();
        assert_eq!(arena.region_of(ninth), 1);
    }

    #[test]
    fn slot_ptr_supports_non_copy_elements() {
        use std::sync::atomic::AtomicU64 as StdAtomicU64;

        #[derive(Default)]
        struct Counter(StdAtomicU64);

        let arena = RegionArena::<Counter>::create(4, 2).unwrap();
        let slot = arena.alloc().unwrap();
        let ptr = arena.slot_ptr(slot).unwrap();
        unsafe {
            (*ptr).0.store(7, Ordering::Relaxed);
            assert_eq!((*ptr).0.load(Ordering::Relaxed), 7);
        }
        assert!(arena.slot_ptr(slot + 1).is_none());
    }

    #[test]
    fn reset_invalidates_prior_slots_from_get() {
        let arena = RegionArena::<u64>::create(4, 2).unwrap();
        arena.add(1).unwrap();
        arena.add(2).unwrap();
        arena.reset();
        assert_eq!(arena.get(0), None);
        assert_eq!(arena.get(1), None);
        let fresh = arena.add(3).unwrap();
        assert_eq!(arena.get(fresh), Some(3));
    }
}
