//! Monotonic tick sources.
//!
//! Scenarios bracket every probe call with two `now()` reads and report the
//! tick frequency once per run, so a clock only needs to be monotonic and to
//! know its own resolution.

use std::cell::Cell;
use std::time::Instant;

/// Default resolution for [`MonotonicClock`]: one tick per microsecond.
pub const DEFAULT_TICK_HZ: u32 = 1_000_000;

/// A monotonic tick counter with a fixed frequency.
pub trait ClockSource {
    /// Current tick count. Never decreases.
    fn now(&self) -> u64;

    /// Ticks per second.
    fn tick_hz(&self) -> u32;
}

impl<C: ClockSource + ?Sized> ClockSource for &C {
    fn now(&self) -> u64 {
        (**self).now()
    }

    fn tick_hz(&self) -> u32 {
        (**self).tick_hz()
    }
}

/// Wall-clock ticks since construction, at `tick_hz` resolution.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    tick_hz: u32,
}

impl MonotonicClock {
    #[must_use]
    pub fn new(tick_hz: u32) -> Self {
        Self {
            origin: Instant::now(),
            tick_hz: tick_hz.max(1),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_HZ)
    }
}

impl ClockSource for MonotonicClock {
    fn now(&self) -> u64 {
        let nanos = self.origin.elapsed().as_nanos();
        let ticks = nanos.saturating_mul(u128::from(self.tick_hz)) / 1_000_000_000;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    fn tick_hz(&self) -> u32 {
        self.tick_hz
    }
}

/// Deterministic clock: every read returns the previous value plus `step`.
///
/// Gives byte-identical telemetry across runs.
#[derive(Debug, Clone)]
pub struct SteppingClock {
    next: Cell<u64>,
    step: u64,
    tick_hz: u32,
}

impl SteppingClock {
    #[must_use]
    pub fn new(start: u64, step: u64, tick_hz: u32) -> Self {
        Self {
            next: Cell::new(start),
            step,
            tick_hz: tick_hz.max(1),
        }
    }
}

impl Default for SteppingClock {
    fn default() -> Self {
        Self::new(0, 1, 1000)
    }
}

impl ClockSource for SteppingClock {
    fn now(&self) -> u64 {
        let t = self.next.get();
        self.next.set(t.saturating_add(self.step));
        t
    }

    fn tick_hz(&self) -> u32 {
        self.tick_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_clock_advances_per_read() {
        let clock = SteppingClock::new(10, 5, 100);
        assert_eq!(clock.now(), 10);
        assert_eq!(clock.now(), 15);
        assert_eq!(clock.now(), 20);
        assert_eq!(clock.tick_hz(), 100);
    }

    #[test]
    fn monotonic_clock_never_decreases() {
        let clock = MonotonicClock::default();
        let mut last = clock.now();
        for _ in 0..1000 {
            let t = clock.now();
            assert!(t >= last);
            last = t;
        }
        assert_eq!(clock.tick_hz(), DEFAULT_TICK_HZ);
    }

    #[test]
    fn zero_frequency_is_clamped() {
        assert_eq!(MonotonicClock::new(0).tick_hz(), 1);
        assert_eq!(SteppingClock::new(0, 1, 0).tick_hz(), 1);
    }
}
