//! Configuration constants shared by the region arena and job scheduler.

/// Cache line size assumed for padding (bytes).
pub const CACHELINE: usize = 64;

/// Number of elements per arena region.
pub const REGION_CAPACITY: usize = 4096;

/// Maximum number of regions an arena may hold.
pub const MAX_REGIONS: usize = 1024;

/// Hard ceiling on `max_regions` any `RegionArena::create` call may
/// request, independent of what a particular arena is configured with.
///
/// `ensure_region` aborts the process when an arena *runs into* its own
/// configured `max_regions` at allocation time (spec.md §4.4's
/// fail-fast rule) — that is a runtime capacity exhaustion the caller
/// sized its arena too small for. This constant instead bounds the
/// *request itself*: a `max_regions` this large would make the sparse
/// descriptor array (one `AtomicPtr` per region) absurdly large before a
/// single element is ever allocated, so it is rejected as
/// `SeakError::CapacityExceeded` up front rather than accepted and left
/// to abort later.
pub const ABSOLUTE_MAX_REGIONS: usize = 1 << 20;

/// Maximum number of live `JobHandle`s an arena epoch can hold.
pub const MAX_JOBS: usize = REGION_CAPACITY * MAX_REGIONS;

/// Completion count, within an epoch, that triggers an epoch reset.
pub const RESET_THRESHOLD: usize = MAX_JOBS - 20;
