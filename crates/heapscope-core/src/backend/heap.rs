//! General-purpose heap: first-fit over an address-ordered free list.
//!
//! Every block starts with an in-band 8-byte header:
//!
//! ```text
//! +0  u32  block size in bytes (header included) | ALLOCATED_BIT
//! +4  u32  offset of the next free block (NIL when allocated or last)
//! ```
//!
//! Freed blocks are merged with adjacent free neighbours. `free` has no return
//! channel: a header without the allocated bit is silently ignored, and any
//! header carrying the bit is trusted. Overrunning a block rewrites the header
//! of whatever follows it.

use super::region::{Region, align_up};
use crate::probe::{AllocationHandle, AllocatorProbe, FreeOutcome, UsageSnapshot};

/// In-band header size.
pub const HEADER_SIZE: usize = 8;

/// Payload alignment.
pub const ALIGNMENT: usize = 8;

/// Smallest block worth splitting off.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE * 2;

const ALLOCATED_BIT: u32 = 1 << 31;
const NIL: u32 = u32::MAX;

/// First-fit heap with in-band headers.
#[derive(Debug, Clone)]
pub struct GeneralHeap {
    name: String,
    region: Region,
    free_head: u32,
    capacity: usize,
    free_bytes: usize,
}

impl GeneralHeap {
    /// Heap over `heap_bytes` (rounded down to the alignment) at `base`.
    #[must_use]
    pub fn new(name: impl Into<String>, base: usize, heap_bytes: usize) -> Self {
        let max = (ALLOCATED_BIT as usize) - ALIGNMENT;
        let capacity = (heap_bytes.min(max) / ALIGNMENT) * ALIGNMENT;
        let mut region = Region::new(base, capacity);
        let free_head = if capacity >= MIN_BLOCK_SIZE {
            region.write_u32(0, capacity as u32);
            region.write_u32(4, NIL);
            0
        } else {
            NIL
        };
        Self {
            name: name.into(),
            region,
            free_head,
            capacity: if free_head == NIL { 0 } else { capacity },
            free_bytes: if free_head == NIL { 0 } else { capacity },
        }
    }

    /// Bound on free-list walks; a corrupted list may contain a cycle.
    fn max_steps(&self) -> usize {
        self.region.len() / MIN_BLOCK_SIZE + 1
    }

    fn block_size(&self, block: u32) -> Option<usize> {
        self.region
            .read_u32(block as usize)
            .map(|w| (w & !ALLOCATED_BIT) as usize)
    }

    fn next_of(&self, block: u32) -> Option<u32> {
        self.region.read_u32(block as usize + 4)
    }

    fn set_header(&mut self, block: u32, size: usize, allocated: bool, next: u32) -> bool {
        let mut word = size as u32;
        if allocated {
            word |= ALLOCATED_BIT;
        }
        self.region.write_u32(block as usize, word) && self.region.write_u32(block as usize + 4, next)
    }

    fn set_next(&mut self, prev: Option<u32>, next: u32) {
        match prev {
            Some(p) => {
                self.region.write_u32(p as usize + 4, next);
            }
            None => self.free_head = next,
        }
    }

    fn insert_free(&mut self, block: u32) {
        let Some(mut size) = self.block_size(block) else {
            return;
        };

        let mut prev: Option<u32> = None;
        let mut cur = self.free_head;
        let mut steps = 0;
        while cur != NIL && cur < block {
            steps += 1;
            if steps > self.max_steps() {
                // Cyclic list: the block is dropped from circulation.
                return;
            }
            prev = Some(cur);
            match self.next_of(cur) {
                Some(n) => cur = n,
                None => return,
            }
        }
        if cur == block {
            return;
        }

        let mut merged = block;
        if let Some(p) = prev
            && let Some(prev_size) = self.block_size(p)
            && p as usize + prev_size == block as usize
        {
            size += prev_size;
            merged = p;
        }

        let mut next = cur;
        if cur != NIL
            && merged as usize + size == cur as usize
            && let Some(cur_size) = self.block_size(cur)
        {
            size += cur_size;
            next = self.next_of(cur).unwrap_or(NIL);
        }

        self.set_header(merged, size, false, next);
        if merged != prev.unwrap_or(NIL) {
            self.set_next(prev, merged);
        }
    }
}

impl AllocatorProbe for GeneralHeap {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&mut self, size: usize) -> Option<AllocationHandle> {
        if size == 0 {
            return None;
        }
        let wanted = align_up(size, ALIGNMENT)?.checked_add(HEADER_SIZE)?;
        if wanted > self.free_bytes {
            return None;
        }

        let mut prev: Option<u32> = None;
        let mut cur = self.free_head;
        let mut steps = 0;
        let block_size = loop {
            if cur == NIL {
                return None;
            }
            steps += 1;
            if steps > self.max_steps() {
                return None;
            }
            let block_size = self.block_size(cur)?;
            if block_size >= wanted && cur as usize + block_size <= self.region.len() {
                break block_size;
            }
            prev = Some(cur);
            cur = self.next_of(cur)?;
        };

        let next = self.next_of(cur)?;
        let taken = if block_size - wanted >= MIN_BLOCK_SIZE {
            let split = cur + wanted as u32;
            if self.set_header(split, block_size - wanted, false, next) {
                self.set_next(prev, split);
                wanted
            } else {
                self.set_next(prev, next);
                block_size
            }
        } else {
            self.set_next(prev, next);
            block_size
        };

        self.set_header(cur, taken, true, NIL);
        self.free_bytes = self.free_bytes.saturating_sub(taken);
        Some(AllocationHandle::from_addr(
            self.region.addr_of(cur as usize + HEADER_SIZE),
        ))
    }

    fn free(&mut self, handle: AllocationHandle) -> FreeOutcome {
        let Some(offset) = self.region.offset_of(handle.addr()) else {
            return FreeOutcome::NoSignal;
        };
        let Some(header) = offset.checked_sub(HEADER_SIZE) else {
            return FreeOutcome::NoSignal;
        };
        let Some(word) = self.region.read_u32(header) else {
            return FreeOutcome::NoSignal;
        };
        if word & ALLOCATED_BIT == 0 {
            return FreeOutcome::NoSignal;
        }
        let size = (word & !ALLOCATED_BIT) as usize;
        if size < MIN_BLOCK_SIZE || header + size > self.region.len() {
            return FreeOutcome::NoSignal;
        }

        self.region.write_u32(header, size as u32);
        self.free_bytes = (self.free_bytes + size).min(self.capacity);
        self.insert_free(header as u32);
        FreeOutcome::NoSignal
    }

    fn query_usage(&self) -> UsageSnapshot {
        UsageSnapshot::instant(self.free_bytes, self.capacity - self.free_bytes)
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
        let wanted = align_up(size.max(1), ALIGNMENT)
            .and_then(|s| s.checked_add(HEADER_SIZE))
            .unwrap_or(usize::MAX);
        self.capacity / wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: usize = 0x2000_0000;

    fn heap(bytes: usize) -> GeneralHeap {
        GeneralHeap::new("heap", BASE, bytes)
    }

    #[test]
    fn fresh_heap_is_all_free() {
        let h = heap(4096);
        let usage = h.query_usage();
        assert_eq!(usage.free_bytes, 4096);
        assert_eq!(usage.allocated_bytes, 0);
    }

    #[test]
    fn allocation_charges_header_and_alignment() {
        let mut h = heap(4096);
        let p = h.allocate(100).unwrap();
        assert_eq!(p.addr(), BASE + HEADER_SIZE);
        assert_eq!(h.query_usage().allocated_bytes, 104 + HEADER_SIZE);
    }

    #[test]
    fn zero_size_allocation_fails() {
        let mut h = heap(4096);
        assert!(h.allocate(0).is_none());
    }

    #[test]
    fn free_and_coalesce_restores_full_heap() {
        let mut h = heap(4096);
        let a = h.allocate(128).unwrap();
        let b = h.allocate(128).unwrap();
        let c = h.allocate(128).unwrap();
        assert_eq!(h.free(b), FreeOutcome::NoSignal);
        assert_eq!(h.free(a), FreeOutcome::NoSignal);
        assert_eq!(h.free(c), FreeOutcome::NoSignal);
        assert_eq!(h.query_usage().free_bytes, 4096);

        // Coalesced back into a single block large enough for nearly everything.
        assert!(h.allocate(4096 - HEADER_SIZE).is_some());
    }

    #[test]
    fn freed_block_is_reused_first_fit() {
        let mut h = heap(4096);
        let a = h.allocate(128).unwrap();
        let _b = h.allocate(128).unwrap();
        h.free(a);
        assert_eq!(h.allocate(128), Some(a));
    }

    #[test]
    fn double_free_is_silently_ignored() {
        let mut h = heap(4096);
        let a = h.allocate(128).unwrap();
        let _keep = h.allocate(64).unwrap();
        h.free(a);
        let after_first = h.query_usage();
        assert_eq!(h.free(a), FreeOutcome::NoSignal);
        assert_eq!(h.query_usage(), after_first);
    }

    #[test]
    fn offset_free_on_zeroed_payload_is_ignored() {
        let mut h = heap(4096);
        let a = h.allocate(128).unwrap();
        let before = h.query_usage();
        assert_eq!(h.free(a.corrupt_handle(64)), FreeOutcome::NoSignal);
        assert_eq!(h.query_usage(), before);
    }

    #[test]
    fn overflow_rewrites_neighbour_header_and_leaks_it() {
        let mut h = heap(4096);
        let a = h.allocate(128).unwrap();
        let b = h.allocate(128).unwrap();
        assert_eq!(h.write_bytes(a, 128 + 8, 0xFF), 136);

        let c = h.allocate(128).unwrap();
        h.free(c);
        let before = h.query_usage();
        // B's header now claims an impossible size, so the free is dropped.
        h.free(b);
        assert_eq!(h.query_usage(), before);
        h.free(a);
        assert_eq!(h.query_usage().allocated_bytes, 128 + HEADER_SIZE);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut h = heap(1024);
        let max = h.max_allocations(128);
        let mut got = 0;
        while h.allocate(128).is_some() {
            got += 1;
        }
        assert_eq!(got, max);
        assert!(got > 0);
    }

    #[test]
    fn foreign_address_is_ignored() {
        let mut h = heap(1024);
        assert_eq!(h.free(AllocationHandle::from_addr(0xDEAD)), FreeOutcome::NoSignal);
        assert_eq!(h.write_bytes(AllocationHandle::from_addr(0xDEAD), 4, 1), 0);
        assert!(h.read_bytes(AllocationHandle::from_addr(0xDEAD), 4).is_empty());
    }
}
