//! HeapOverflow: two adjacent blocks, overrun the first into the second,
//! then allocate again to see what the corrupted metadata hands out.

use super::{FreeIntent, Session};
use crate::wire::{FaultReason, tag};

/// Byte written by the overflow.
pub const OVERFLOW_BYTE: u8 = 0xFF;

pub fn run(session: &mut Session<'_>) {
    let size = session.params().block_size;
    let extra = session.params().overflow_extra;

    let Some(victim) = session.alloc("setup", size) else {
        session.fault(FaultReason::Oom);
        return;
    };
    let Some(neighbour) = session.alloc("setup", size) else {
        session.fault(FaultReason::Oom);
        session.free("cleanup", victim, size, FreeIntent::Release);
        return;
    };
    session.snapshot("after_setup");

    session.timed_write(
        "hof_write",
        "memset_overflow",
        victim,
        size.saturating_add(extra),
        OVERFLOW_BYTE,
        tag::HOF_WRITE_DONE,
    );
    session.snapshot("post_primitive_trigger");

    match session.alloc("hof_check_alloc", size) {
        Some(probe_block) => {
            session.free("cleanup", probe_block, size, FreeIntent::Release);
        }
        None => session.fault(FaultReason::Oom),
    }
    session.snapshot("after_hof_check_alloc");

    session.free("cleanup", neighbour, size, FreeIntent::Release);
    session.free("cleanup", victim, size, FreeIntent::Release);
}
