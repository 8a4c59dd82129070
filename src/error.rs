//! Error types shared by every ring, the region arena, and the scheduler.

use thiserror::Error;

/// Result type alias used throughout seakutils.
pub type Result<T> = std::result::Result<T, SeakError>;

/// Unified error/status type for seakutils operations.
///
/// Most of these are not "errors" in the panic sense — `Full` and `Empty`
/// are expected, recoverable outcomes of non-blocking operations and
/// callers are expected to match on them rather than propagate with `?`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeakError {
    /// A required handle or pointer argument was absent.
    #[error("null argument")]
    NullArg,

    /// Bounded ring has no free slot for a non-blocking send.
    #[error("ring is full")]
    Full,

    /// Bounded ring has no element for a non-blocking receive.
    #[error("ring is empty")]
    Empty,

    /// The ring, or this endpoint's handle, is closed.
    #[error("ring is closed")]
    Closed,

    /// Allocation failed while creating a ring or arena region.
    #[error("allocation failed")]
    AllocFailure,

    /// A region index met or exceeded the arena's hard region limit.
    #[error("region capacity exceeded: requested {requested}, max {max}")]
    CapacityExceeded {
        /// Region index that was requested.
        requested: usize,
        /// Configured maximum number of regions.
        max: usize,
    },

    /// `spawn_scheduler` was called a second time against the process-wide
    /// singleton, which only ever initializes once.
    #[error("scheduler already initialized")]
    AlreadyInitialized,
}

impl SeakError {
    /// Whether retrying the same operation later could plausibly succeed.
    pub fn is_recoverable(self) -> bool {
        matches!(self, SeakError::Full | SeakError::Empty)
    }
}
