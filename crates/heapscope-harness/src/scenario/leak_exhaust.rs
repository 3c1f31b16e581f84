//! LeakExhaust: allocate fixed-size blocks without ever freeing until the
//! backend fails.
//!
//! Handles are not kept. The loop is also bounded by an allocation guard
//! (configured, or the backend's own bound plus one) so a backend that never
//! fails still terminates, with `FAULT LIMIT` instead of `FAULT OOM`.

use super::Session;
use crate::wire::FaultReason;

pub fn run(session: &mut Session<'_>) {
    let size = session.params().block_size;
    let every = session.params().leak_snapshot_every;
    let limit = session
        .params()
        .max_leak_allocations
        .unwrap_or_else(|| session.max_allocations(size).saturating_add(1));

    let mut held: usize = 0;
    loop {
        if held >= limit {
            session.fault(FaultReason::Limit);
            return;
        }
        if session.alloc("leak", size).is_none() {
            session.fault(FaultReason::Oom);
            return;
        }
        held += 1;
        if every > 0 && held.is_multiple_of(every) {
            session.snapshot(&format!("after_malloc_{held}"));
        }
    }
}
