//! FakeFree: free an address halfway into a live block, then the block itself.
//!
//! The offset is half of the *requested* size. Backends that round requests
//! up must not move it.

use super::{FreeIntent, Session};
use crate::wire::FaultReason;

/// Offset of the forged handle for a `size`-byte request.
#[must_use]
pub const fn fake_offset(size: usize) -> usize {
    size / 2
}

pub fn run(session: &mut Session<'_>) {
    let size = session.params().block_size;

    let Some(block) = session.alloc("setup", size) else {
        session.fault(FaultReason::Oom);
        return;
    };
    session.snapshot("after_setup");

    let offset = fake_offset(size);
    let forged = block.corrupt_handle(offset);
    session.free("fakefree", forged, offset, FreeIntent::FakeFree);
    session.snapshot("after_fake_free");

    session.free("cleanup", block, size, FreeIntent::Release);
}
