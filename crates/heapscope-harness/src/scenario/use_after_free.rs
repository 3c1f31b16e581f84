//! UseAfterFree: fill a block, free it, scribble a marker through the stale
//! handle, allocate again and search the new block for the marker.
//!
//! A backend that hands the same block straight back shows the marker
//! (`LEAK`). One that returns fresh zeroed memory does not (`NOLEAK`).

use super::{FreeIntent, Session};
use crate::wire::{FaultReason, tag};

pub fn run(session: &mut Session<'_>) {
    let size = session.params().block_size;
    let fill = session.params().fill_pattern;
    let marker = session.params().uaf_marker;

    let Some(first) = session.alloc("setup", size) else {
        session.fault(FaultReason::Oom);
        return;
    };
    session.fill(first, size, fill);
    session.snapshot("after_setup");

    session.free("setup", first, size, FreeIntent::Release);
    session.snapshot("after_free1");

    session.timed_write("uaf_write", "memset_uaf", first, size, marker, tag::UAF_WRITE_DONE);
    session.snapshot("after_uaf_write");

    let Some(second) = session.alloc("uaf_realloc", size) else {
        session.fault(FaultReason::Oom);
        return;
    };
    session.inspect("uaf_inspect", second, size, marker);
    session.snapshot("post_primitive_realloc");

    session.free("cleanup", second, size, FreeIntent::Release);
}
