//! MixedLifetime: pin long-lived blocks, churn transient bursts around them,
//! then release the pins in allocation order.
//!
//! Pins are twice the block size, or one block size on backends that can
//! never serve the larger request (fixed-block pools). After each round the
//! transient blocks are gone again, so on a reclaiming backend the round-end
//! snapshot matches the one taken right after pinning.

use super::Session;
use crate::wire::FaultReason;

pub fn run(session: &mut Session<'_>) {
    let size = session.params().block_size;
    let pin_size = pin_size(session, size);
    let pin_count = session.params().pin_count;
    let rounds = session.params().burst_rounds;
    let count = session.params().burst_count;

    let mut pins = Vec::with_capacity(pin_count);
    for _ in 0..pin_count {
        match session.alloc("pin", pin_size) {
            Some(handle) => pins.push(handle),
            None => {
                session.fault(FaultReason::Oom);
                session.release_fifo("cleanup", pins, pin_size);
                return;
            }
        }
    }
    session.snapshot("after_pins");

    let mut burst = Vec::with_capacity(count);
    'rounds: for round in 1..=rounds {
        for _ in 0..count {
            match session.alloc("burst", size) {
                Some(handle) => burst.push(handle),
                None => {
                    session.fault(FaultReason::Oom);
                    session.release_lifo("burst", &mut burst, size);
                    break 'rounds;
                }
            }
        }
        session.snapshot(&format!("after_burst_alloc_{round:02}"));

        session.release_lifo("burst", &mut burst, size);
        session.snapshot(&format!("after_burst_free_{round:02}"));
    }

    session.release_fifo("cleanup", pins, pin_size);
}

fn pin_size(session: &Session<'_>, size: usize) -> usize {
    let doubled = size.saturating_mul(2);
    if session.max_allocations(doubled) == 0 {
        size
    } else {
        doubled
    }
}
