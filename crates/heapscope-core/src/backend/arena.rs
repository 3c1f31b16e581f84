//! Static arena: a bump pointer over a fixed region.
//!
//! Memory is handed out once and never reclaimed. `free` accepts anything and
//! does nothing, so every address is unique for the arena's lifetime and
//! fresh blocks are always zero.

use super::region::{Region, align_up};
use crate::probe::{AllocationHandle, AllocatorProbe, FreeOutcome, UsageSnapshot};

/// Bump alignment.
pub const ALIGNMENT: usize = 8;

#[derive(Debug, Clone)]
pub struct StaticArena {
    name: String,
    region: Region,
    cursor: usize,
}

impl StaticArena {
    #[must_use]
    pub fn new(name: impl Into<String>, base: usize, arena_bytes: usize) -> Self {
        Self {
            name: name.into(),
            region: Region::new(base, arena_bytes),
            cursor: 0,
        }
    }
}

impl AllocatorProbe for StaticArena {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&mut self, size: usize) -> Option<AllocationHandle> {
        if size == 0 {
            return None;
        }
        let start = align_up(self.cursor, ALIGNMENT)?;
        let end = start.checked_add(size)?;
        if end > self.region.len() {
            return None;
        }
        self.cursor = end;
        Some(AllocationHandle::from_addr(self.region.addr_of(start)))
    }

    fn free(&mut self, _handle: AllocationHandle) -> FreeOutcome {
        FreeOutcome::NoSignal
    }

    fn query_usage(&self) -> UsageSnapshot {
        UsageSnapshot::instant(self.region.len() - self.cursor, self.cursor)
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
        match align_up(size.max(1), ALIGNMENT) {
            Some(stride) => self.region.len().div_ceil(stride),
            None => 0,
        }
    }
}
