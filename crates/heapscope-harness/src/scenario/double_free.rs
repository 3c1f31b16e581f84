//! DoubleFree: allocate, free, then free the same handle again.
//!
//! The second free is attempted whatever the first one reported.

use super::{FreeIntent, Session};
use crate::wire::FaultReason;

pub fn run(session: &mut Session<'_>) {
    let size = session.params().block_size;

    let Some(block) = session.alloc("setup", size) else {
        session.fault(FaultReason::Oom);
        return;
    };
    session.snapshot("after_setup");

    session.free("setup", block, size, FreeIntent::Release);
    session.snapshot("after_first_free");

    session.free("df_trigger", block, size, FreeIntent::DoubleFree);
    session.snapshot("post_primitive_trigger");
}
