//! Segregated-fit heap.
//!
//! Small requests are rounded to a power-of-two class and served from that
//! class's LIFO free list, falling back to carving fresh space from a bump
//! cursor. Requests above [`MAX_SMALL_SIZE`] take a first-fit list of freed
//! large blocks, then the cursor. Blocks never migrate between classes.
//!
//! Bookkeeping is out-of-band (an active map keyed by offset plus a
//! recently-freed set), so `free` can tell double and unknown frees apart and
//! reports both as errors without touching state.

use std::collections::{HashMap, HashSet};

use super::region::{Region, align_up};
use super::size_class::{self, LARGE_ALIGNMENT, MAX_SMALL_SIZE, NUM_SIZE_CLASSES};
use crate::probe::{AllocationHandle, AllocatorProbe, FreeOutcome, UsageSnapshot};

/// Tracks one live block.
#[derive(Debug, Clone, Copy)]
struct AllocationRecord {
    /// Bytes charged against the region (class size or aligned large size).
    block_size: usize,
    /// Size class index (`NUM_SIZE_CLASSES` for large).
    bin: usize,
}

/// Counters describing which path each request took.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegfitStats {
    pub bin_hits: u64,
    pub fresh_carves: u64,
    pub large_reuses: u64,
    pub double_frees: u64,
    pub unknown_frees: u64,
}

/// Segregated-fit allocator over a private region.
#[derive(Debug, Clone)]
pub struct SegregatedFit {
    name: String,
    region: Region,
    /// Per-class free lists (class index -> stack of free offsets).
    bins: Vec<Vec<usize>>,
    /// Freed large blocks as `(offset, size)`.
    large_free: Vec<(usize, usize)>,
    active: HashMap<usize, AllocationRecord>,
    recently_freed: HashSet<usize>,
    next_offset: usize,
    allocated_bytes: usize,
    stats: SegfitStats,
}

impl SegregatedFit {
    #[must_use]
    pub fn new(name: impl Into<String>, base: usize, heap_bytes: usize) -> Self {
        Self {
            name: name.into(),
            region: Region::new(base, heap_bytes),
            bins: (0..NUM_SIZE_CLASSES).map(|_| Vec::new()).collect(),
            large_free: Vec::new(),
            active: HashMap::new(),
            recently_freed: HashSet::new(),
            // Keep offset 0 unused so no handle equals the bare base address.
            next_offset: LARGE_ALIGNMENT.min(heap_bytes),
            allocated_bytes: 0,
            stats: SegfitStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> SegfitStats {
        self.stats
    }

    fn capacity(&self) -> usize {
        self.region.len().saturating_sub(LARGE_ALIGNMENT)
    }

    fn carve(&mut self, block_size: usize) -> Option<usize> {
        let offset = self.next_offset;
        let end = offset.checked_add(block_size)?;
        if end > self.region.len() {
            return None;
        }
        self.next_offset = end;
        self.stats.fresh_carves += 1;
        Some(offset)
    }

    fn take_large(&mut self, block_size: usize) -> Option<(usize, usize)> {
        let index = self.large_free.iter().position(|&(_, size)| size >= block_size)?;
        self.stats.large_reuses += 1;
        Some(self.large_free.swap_remove(index))
    }

    fn commit(&mut self, offset: usize, record: AllocationRecord) -> AllocationHandle {
        self.active.insert(offset, record);
        self.recently_freed.remove(&offset);
        self.allocated_bytes += record.block_size;
        AllocationHandle::from_addr(self.region.addr_of(offset))
    }
}

impl AllocatorProbe for SegregatedFit {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&mut self, size: usize) -> Option<AllocationHandle> {
        let size = size.max(1);
        let bin = size_class::bin_index(size);

        if bin >= NUM_SIZE_CLASSES {
            let wanted = align_up(size, LARGE_ALIGNMENT)?;
            let (offset, block_size) = match self.take_large(wanted) {
                Some(found) => found,
                None => (self.carve(wanted)?, wanted),
            };
            return Some(self.commit(offset, AllocationRecord { block_size, bin }));
        }

        let block_size = size_class::bin_size(bin);
        let offset = match self.bins[bin].pop() {
            Some(offset) => {
                self.stats.bin_hits += 1;
                offset
            }
            None => self.carve(block_size)?,
        };
        Some(self.commit(offset, AllocationRecord { block_size, bin }))
    }

    fn free(&mut self, handle: AllocationHandle) -> FreeOutcome {
        let Some(offset) = self.region.offset_of(handle.addr()) else {
            self.stats.unknown_frees += 1;
            return FreeOutcome::ErrorReported;
        };
        let Some(record) = self.active.remove(&offset) else {
            if self.recently_freed.contains(&offset) {
                self.stats.double_frees += 1;
            } else {
                self.stats.unknown_frees += 1;
            }
            return FreeOutcome::ErrorReported;
        };

        if record.bin >= NUM_SIZE_CLASSES {
            self.large_free.push((offset, record.block_size));
        } else {
            self.bins[record.bin].push(offset);
        }
        self.recently_freed.insert(offset);
        self.allocated_bytes = self.allocated_bytes.saturating_sub(record.block_size);
        FreeOutcome::Ok
    }

    fn query_usage(&self) -> UsageSnapshot {
        let capacity = self.capacity();
        UsageSnapshot::instant(
            capacity.saturating_sub(self.allocated_bytes),
            self.allocated_bytes,
        )
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
        let size = size.max(1);
        let block = if size > MAX_SMALL_SIZE {
            align_up(size, LARGE_ALIGNMENT).unwrap_or(usize::MAX)
        } else {
            size_class::bin_size(size_class::bin_index(size))
        };
        self.capacity() / block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: usize = 0x2000_0000;

    fn segfit() -> SegregatedFit {
        SegregatedFit::new("segfit", BASE, 64 * 1024)
    }

    #[test]
    fn first_block_skips_base_address() {
        let mut s = segfit();
        let p = s.allocate(100).unwrap();
        assert_eq!(p.addr(), BASE + LARGE_ALIGNMENT);
        assert_eq!(s.query_usage().allocated_bytes, 128);
    }

    #[test]
    fn lifo_reuse_within_class() {
        let mut s = segfit();
        let a = s.allocate(128).unwrap();
        let b = s.allocate(128).unwrap();
        assert_eq!(s.free(a), FreeOutcome::Ok);
        assert_eq!(s.free(b), FreeOutcome::Ok);
        assert_eq!(s.allocate(120), Some(b));
        assert_eq!(s.allocate(128), Some(a));
        assert_eq!(s.stats().bin_hits, 2);
    }

    #[test]
    fn classes_do_not_share_blocks() {
        let mut s = segfit();
        let small = s.allocate(16).unwrap();
        s.free(small);
        let other = s.allocate(64).unwrap();
        assert_ne!(small, other);
    }

    #[test]
    fn double_free_reported_and_state_unchanged() {
        let mut s = segfit();
        let a = s.allocate(128).unwrap();
        assert_eq!(s.free(a), FreeOutcome::Ok);
        let usage = s.query_usage();
        assert_eq!(s.free(a), FreeOutcome::ErrorReported);
        assert_eq!(s.query_usage(), usage);
        assert_eq!(s.stats().double_frees, 1);
        // Only one copy went onto the free list.
        assert_eq!(s.allocate(128), Some(a));
        assert_ne!(s.allocate(128), Some(a));
    }

    #[test]
    fn offset_free_reported_as_unknown() {
        let mut s = segfit();
        let a = s.allocate(128).unwrap();
        assert_eq!(s.free(a.corrupt_handle(64)), FreeOutcome::ErrorReported);
        assert_eq!(s.stats().unknown_frees, 1);
        assert_eq!(s.free(a), FreeOutcome::Ok);
    }

    #[test]
    fn large_blocks_reuse_first_fit() {
        let mut s = segfit();
        let big = s.allocate(MAX_SMALL_SIZE + 1).unwrap();
        assert_eq!(s.free(big), FreeOutcome::Ok);
        assert_eq!(s.allocate(MAX_SMALL_SIZE + 8), Some(big));
        assert_eq!(s.stats().large_reuses, 1);
    }

    #[test]
    fn exhaustion_matches_max_allocations() {
        let mut s = SegregatedFit::new("segfit", BASE, 4096);
        let max = s.max_allocations(128);
        let mut count = 0;
        while s.allocate(128).is_some() {
            count += 1;
        }
        assert_eq!(count, max);
    }
}
