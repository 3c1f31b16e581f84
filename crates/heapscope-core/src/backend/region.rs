//! Backing store shared by every backend: a byte region mapped at a fake
//! base address.
//!
//! Handles are addresses in `[base, base + len)`. All accesses are clamped to
//! the region, so stray writes can corrupt backend metadata but never host
//! memory.

/// Owned byte region with a fixed base address.
#[derive(Debug, Clone)]
pub struct Region {
    base: usize,
    bytes: Vec<u8>,
}

impl Region {
    /// Zero-filled region of `len` bytes at `base`.
    #[must_use]
    pub fn new(base: usize, len: usize) -> Self {
        Self {
            base,
            bytes: vec![0; len],
        }
    }

    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Address of region offset `offset`.
    #[must_use]
    pub fn addr_of(&self, offset: usize) -> usize {
        self.base.wrapping_add(offset)
    }

    /// Region offset of `addr`, if the address falls inside the region.
    #[must_use]
    pub fn offset_of(&self, addr: usize) -> Option<usize> {
        let offset = addr.checked_sub(self.base)?;
        (offset < self.bytes.len()).then_some(offset)
    }

    /// Fill up to `len` bytes from `offset` with `byte`; returns bytes written.
    pub fn fill(&mut self, offset: usize, len: usize, byte: u8) -> usize {
        if offset >= self.bytes.len() {
            return 0;
        }
        let end = offset.saturating_add(len).min(self.bytes.len());
        self.bytes[offset..end].fill(byte);
        end - offset
    }

    /// Copy up to `len` bytes from `offset`.
    #[must_use]
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        if offset >= self.bytes.len() {
            return Vec::new();
        }
        let end = offset.saturating_add(len).min(self.bytes.len());
        self.bytes[offset..end].to_vec()
    }

    /// Little-endian `u32` at `offset`, or `None` past the end.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let end = offset.checked_add(4)?;
        let raw = self.bytes.get(offset..end)?;
        Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Store a little-endian `u32` at `offset`; returns false past the end.
    pub fn write_u32(&mut self, offset: usize, value: u32) -> bool {
        let Some(end) = offset.checked_add(4) else {
            return false;
        };
        match self.bytes.get_mut(offset..end) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }
}

/// Round `size` up to a multiple of `align` (a power of two).
#[must_use]
pub const fn align_up(size: usize, align: usize) -> Option<usize> {
    match size.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_map_inside_region_only() {
        let region = Region::new(0x1000, 64);
        assert_eq!(region.offset_of(0x1000), Some(0));
        assert_eq!(region.offset_of(0x103F), Some(63));
        assert_eq!(region.offset_of(0x1040), None);
        assert_eq!(region.offset_of(0x0FFF), None);
        assert_eq!(region.addr_of(16), 0x1010);
    }

    #[test]
    fn fill_is_clamped_to_region_end() {
        let mut region = Region::new(0, 16);
        assert_eq!(region.fill(12, 100, 0xFF), 4);
        assert_eq!(region.read(8, 8), vec![0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(region.fill(16, 1, 0xAA), 0);
    }

    #[test]
    fn u32_access_round_trips_and_rejects_tail() {
        let mut region = Region::new(0, 10);
        assert!(region.write_u32(4, 0xDEAD_BEEF));
        assert_eq!(region.read_u32(4), Some(0xDEAD_BEEF));
        assert!(!region.write_u32(8, 1));
        assert_eq!(region.read_u32(8), None);
        assert_eq!(region.read_u32(usize::MAX), None);
    }

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(1, 8), Some(8));
        assert_eq!(align_up(8, 8), Some(8));
        assert_eq!(align_up(129, 8), Some(136));
        assert_eq!(align_up(usize::MAX, 8), None);
    }
}
