//! heapscope core: the pieces a scenario touches below the telemetry layer.
//!
//! This crate provides:
//! - [`clock`]: monotonic tick sources with an exposed tick frequency
//! - [`probe`]: the uniform allocate/free/usage contract every backend implements
//! - [`backend`]: simulated allocator backends (general heap, fixed-block pool,
//!   segregated-fit heap, static arena) over private byte regions
//!
//! Backends never validate on behalf of the caller. Illegal operations reach
//! backend state unmodified; the region model keeps the host process sound
//! while the backend itself is free to become inconsistent.

#![forbid(unsafe_code)]

pub mod backend;
pub mod clock;
pub mod probe;

pub use backend::{BackendConfig, BackendKind, build_probe};
pub use clock::{ClockSource, MonotonicClock, SteppingClock};
pub use probe::{AllocationHandle, AllocatorProbe, FreeOutcome, UsageSnapshot};
