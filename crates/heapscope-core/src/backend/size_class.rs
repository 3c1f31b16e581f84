//! Power-of-two size classes for the segregated-fit backend.

/// Smallest class is `1 << MIN_CLASS_SHIFT` bytes.
pub const MIN_CLASS_SHIFT: u32 = 4;

/// Number of small size classes (16 B through 32 KiB).
pub const NUM_SIZE_CLASSES: usize = 12;

/// Largest request served from a size class.
pub const MAX_SMALL_SIZE: usize = 1 << (MIN_CLASS_SHIFT as usize + NUM_SIZE_CLASSES - 1);

/// Alignment of large (classless) blocks.
pub const LARGE_ALIGNMENT: usize = 16;

/// Class index for `size`, or `NUM_SIZE_CLASSES` for the large path.
#[must_use]
pub fn bin_index(size: usize) -> usize {
    if size > MAX_SMALL_SIZE {
        return NUM_SIZE_CLASSES;
    }
    let rounded = size.max(1).next_power_of_two().max(1 << MIN_CLASS_SHIFT);
    (rounded.trailing_zeros() - MIN_CLASS_SHIFT) as usize
}

/// Block size of class `bin`.
#[must_use]
pub const fn bin_size(bin: usize) -> usize {
    1 << (MIN_CLASS_SHIFT as usize + bin)
}
