//! seakutils - bounded lock-free rings, an epoch-reset region arena, a
//! fixed worker pool, a dependency-aware job scheduler, and a phase
//! barrier, meant to be composed into user-built job graphs and engine
//! subsystems.
//!
//! Every wait in this crate is a `pause()`-spin on a `Closed`/done flag —
//! there is no OS-blocking primitive anywhere in the core. Callers size
//! their worker pools and ring capacities accordingly.

pub mod arena;
pub mod constants;
pub mod cpu;
pub mod error;
pub mod pool;
pub mod ring;
pub mod scheduler;
pub mod waitgroup;

pub use error::{Result, SeakError};
pub use waitgroup::WaitGroup;

/// Crate version, for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
