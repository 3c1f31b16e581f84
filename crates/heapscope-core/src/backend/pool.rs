//! Fixed-block pool: `block_count` blocks of `block_size` bytes with
//! out-of-band used flags.
//!
//! Allocation hands out the lowest free block and does not clear it. `free`
//! reports an error for any address that is not exactly a block start, and
//! accepts a block start whether or not the block is in use.
//!
//! The pool keeps no byte-level accounting. Usage is reported as
//! `blocks x block_size`, so a 40-byte request counts as a full block.

use super::region::Region;
use crate::probe::{AllocationHandle, AllocatorProbe, FreeOutcome, UsageSnapshot};

/// Pool of equally sized blocks.
#[derive(Debug, Clone)]
pub struct FixedBlockPool {
    name: String,
    region: Region,
    block_size: usize,
    used: Vec<bool>,
}

impl FixedBlockPool {
    #[must_use]
    pub fn new(name: impl Into<String>, base: usize, block_size: usize, block_count: usize) -> Self {
        let block_size = block_size.max(1);
        let len = block_size.saturating_mul(block_count);
        Self {
            name: name.into(),
            region: Region::new(base, len),
            block_size,
            used: vec![false; block_count],
        }
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks currently free.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.used.iter().filter(|u| !**u).count()
    }

    fn block_index(&self, addr: usize) -> Option<usize> {
        let offset = self.region.offset_of(addr)?;
        (offset % self.block_size == 0).then_some(offset / self.block_size)
    }
}

impl AllocatorProbe for FixedBlockPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&mut self, size: usize) -> Option<AllocationHandle> {
        if size > self.block_size {
            return None;
        }
        let index = self.used.iter().position(|u| !*u)?;
        self.used[index] = true;
        Some(AllocationHandle::from_addr(
            self.region.addr_of(index * self.block_size),
        ))
    }

    fn free(&mut self, handle: AllocationHandle) -> FreeOutcome {
        match self.block_index(handle.addr()) {
            Some(index) => {
                self.used[index] = false;
                FreeOutcome::Ok
            }
            None => FreeOutcome::ErrorReported,
        }
    }

    fn query_usage(&self) -> UsageSnapshot {
        let free = self.free_blocks();
        let used = self.used.len() - free;
        UsageSnapshot::instant(free * self.block_size, used * self.block_size)
    }

    fn write_bytes(&mut self, handle: AllocationHandle, len: usize, byte: u8) -> usize {
        match self.region.offset_of(handle.addr()) {
            Some(offset) => self.region.fill(offset, len, byte),
            None => 0,
        }
    }

    fn read_bytes(&self, handle: AllocationHandle, len: usize) -> Vec<u8> {
        match self.region.offset_of(handle.addr()) {
            Some(offset) => self.region.read(offset, len),
            None => Vec::new(),
        }
    }

    fn max_allocations(&self, size: usize) -> usize {
        if size > self.block_size {
            0
        } else {
            self.used.len()
        }
    }
}
