//! BurstMalloc: rounds of allocate-many then free-all in reverse.

use super::Session;
use crate::wire::FaultReason;

pub fn run(session: &mut Session<'_>) {
    let size = session.params().block_size;
    let rounds = session.params().burst_rounds;
    let count = session.params().burst_count;

    let mut burst = Vec::with_capacity(count);
    for round in 1..=rounds {
        for _ in 0..count {
            match session.alloc("burst", size) {
                Some(handle) => burst.push(handle),
                None => {
                    session.fault(FaultReason::Oom);
                    session.release_lifo("burst", &mut burst, size);
                    return;
                }
            }
        }
        session.snapshot(&format!("after_alloc_{round:02}"));

        session.release_lifo("burst", &mut burst, size);
        session.snapshot(&format!("after_free_{round:02}"));
    }
}
