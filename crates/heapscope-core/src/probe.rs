//! Allocator probe contract.
//!
//! A probe is a narrow, uniform view over one allocator backend: allocate,
//! free, report usage, and touch payload bytes for deliberate pattern
//! injection. It has no safety net. Handles passed to [`AllocatorProbe::free`]
//! reach the backend exactly as given, including handles the caller forged
//! with [`AllocationHandle::corrupt_handle`].

use std::fmt;

/// Opaque address-sized value returned by a successful allocation.
///
/// A handle stays a plain value after it is freed; nothing stops a scenario
/// from passing it to the backend again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AllocationHandle(usize);

impl AllocationHandle {
    /// Wrap an address issued by a backend.
    ///
    /// Only backends call this. Scenarios obtain handles from
    /// [`AllocatorProbe::allocate`] or [`AllocationHandle::corrupt_handle`].
    #[must_use]
    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    /// The raw address value.
    #[must_use]
    pub const fn addr(self) -> usize {
        self.0
    }

    /// Synthesize a handle at `offset` bytes past `self`.
    ///
    /// The result has no defined relationship to any live allocation. This is
    /// the single entry point for forging handles, so every call site is an
    /// intentional misuse.
    #[must_use]
    pub const fn corrupt_handle(self, offset: usize) -> Self {
        Self(self.0.wrapping_add(offset))
    }
}

impl fmt::Display for AllocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Whatever signal the backend gave for a free request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOutcome {
    /// The backend reported success.
    Ok,
    /// The backend reported an error code; its state is backend-defined.
    ErrorReported,
    /// The backend's free has no return channel.
    NoSignal,
}

/// Free/allocated byte counts at one instant, plus the peak allocated count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub free_bytes: usize,
    pub allocated_bytes: usize,
    pub high_watermark_bytes: usize,
}

impl UsageSnapshot {
    /// A point-in-time reading whose watermark is the current allocation.
    ///
    /// The telemetry layer folds this into the run-wide peak.
    #[must_use]
    pub const fn instant(free_bytes: usize, allocated_bytes: usize) -> Self {
        Self {
            free_bytes,
            allocated_bytes,
            high_watermark_bytes: allocated_bytes,
        }
    }

    /// Replace the watermark with a run-wide peak.
    #[must_use]
    pub const fn with_watermark(mut self, high_watermark_bytes: usize) -> Self {
        self.high_watermark_bytes = high_watermark_bytes;
        self
    }
}

/// Uniform allocate/free/usage surface over one backend instance.
pub trait AllocatorProbe {
    /// Allocator name printed in run banners.
    fn name(&self) -> &str;

    /// Request `size` bytes. `None` when the backend reports exhaustion.
    fn allocate(&mut self, size: usize) -> Option<AllocationHandle>;

    /// Request release of `handle`, valid or not, passed through unmodified.
    fn free(&mut self, handle: AllocationHandle) -> FreeOutcome;

    /// Current usage from the backend's own accounting (or its documented proxy).
    fn query_usage(&self) -> UsageSnapshot;

    /// Write `len` copies of `byte` starting at `handle`.
    ///
    /// The write is not limited to the allocation: it may run over adjacent
    /// blocks and metadata. It stops at the end of the backend's region.
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, handle: AllocationHandle, len: usize, byte: u8) -> usize;

    /// Read up to `len` bytes starting at `handle` (clamped to the region).
    fn read_bytes(&self, handle: AllocationHandle, len: usize) -> Vec<u8>;

    /// Upper bound on simultaneous successful allocations of `size` bytes.
    fn max_allocations(&self, size: usize) -> usize;
}

impl<P: AllocatorProbe + ?Sized> AllocatorProbe for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn allocate(&mut self, size: usize) -> Option<AllocationHandle> {
        (**self).allocate(size)
    }

    fn free(&mut self, handle: AllocationHandle) -> FreeOutcome {
        (**self).free(handle)
    }

    fn query_usage(&self) -> UsageSnapshot {
        (**self).query_usage()
    }

    fn write_bytes(&mut self, handle: AllocationHandle, len: usize, byte: u8) -> usize {
        (**self).write_bytes(handle, len, byte)
    }

    fn read_bytes(&self, handle: AllocationHandle, len: usize) -> Vec<u8> {
        (**self).read_bytes(handle, len)
    }

    fn max_allocations(&self, size: usize) -> usize {
        (**self).max_allocations(size)
    }
}
