//! Scenario engine.
//!
//! Each scenario is a fixed sequence of probe calls. Every call is bracketed
//! by two clock reads and followed by a `TIME` record. The shared frame is
//!
//! ```text
//! start banner, META, SNAP baseline, <steps>, SNAP post_cleanup, end banner
//! ```
//!
//! Allocation failure is the only condition that ends a scenario early. It
//! emits `FAULT` and the scenario frees whatever it still holds before
//! returning. Illegal frees are never fatal; their outcome is just recorded.

pub mod burst_malloc;
pub mod double_free;
pub mod fake_free;
pub mod heap_overflow;
pub mod leak_exhaust;
pub mod mixed_lifetime;
pub mod use_after_free;

use std::fmt;

use heapscope_core::{AllocationHandle, AllocatorProbe, ClockSource, FreeOutcome};
use serde::{Deserialize, Serialize};

use crate::config::ScenarioParams;
use crate::telemetry::{RunContext, Telemetry, TickSpan};
use crate::wire::{FaultReason, tag};

/// The fixed scenario catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScenarioKind {
    DoubleFree,
    FakeFree,
    HeapOverflow,
    LeakExhaust,
    MixedLifetime,
    UseAfterFree,
    BurstMalloc,
}

impl ScenarioKind {
    pub const ALL: [Self; 7] = [
        Self::DoubleFree,
        Self::FakeFree,
        Self::HeapOverflow,
        Self::LeakExhaust,
        Self::MixedLifetime,
        Self::UseAfterFree,
        Self::BurstMalloc,
    ];

    /// Name used in banners and artifact file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DoubleFree => "DoubleFree",
            Self::FakeFree => "FakeFree",
            Self::HeapOverflow => "HeapOverflow",
            Self::LeakExhaust => "LeakExhaust",
            Self::MixedLifetime => "MixedLifetime",
            Self::UseAfterFree => "UseAfterFree",
            Self::BurstMalloc => "BurstMalloc",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::DoubleFree => "free the same handle twice",
            Self::FakeFree => "free an address offset into a live block, then the real one",
            Self::HeapOverflow => "write past the end of a block into its neighbour, then allocate again",
            Self::LeakExhaust => "allocate without freeing until the backend fails",
            Self::MixedLifetime => "pinned allocations under repeated transient bursts",
            Self::UseAfterFree => "write through a stale handle and look for it in the next block",
            Self::BurstMalloc => "repeated allocate-all then free-all-in-reverse rounds",
        }
    }

    /// Parse from string (case-insensitive; `-`, `_` and spaces ignored).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "doublefree" | "df" => Some(Self::DoubleFree),
            "fakefree" | "ff" | "invalidfree" | "offsetfree" => Some(Self::FakeFree),
            "heapoverflow" | "hof" | "overflow" => Some(Self::HeapOverflow),
            "leakexhaust" | "leak" | "exhaust" => Some(Self::LeakExhaust),
            "mixedlifetime" | "mixed" => Some(Self::MixedLifetime),
            "useafterfree" | "uaf" => Some(Self::UseAfterFree),
            "burstmalloc" | "burst" => Some(Self::BurstMalloc),
            _ => None,
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the scenario meant by a free request. Only affects the result tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeIntent {
    /// Releasing a handle the scenario legitimately owns.
    Release,
    /// Freeing an already-freed handle.
    DoubleFree,
    /// Freeing an address the backend never issued.
    FakeFree,
}

impl FreeIntent {
    /// Result tag for `outcome`.
    ///
    /// Legitimate frees report `OK` or `ERR`. Misuse reports `OK` if the
    /// backend accepted it, `BAD_FREE` if it complained, and an attempt tag
    /// when the backend gives no signal at all.
    #[must_use]
    pub const fn tag(self, outcome: FreeOutcome) -> &'static str {
        match (self, outcome) {
            (Self::Release, FreeOutcome::ErrorReported) => tag::ERR,
            (Self::Release, _) => tag::OK,
            (_, FreeOutcome::Ok) => tag::OK,
            (_, FreeOutcome::ErrorReported) => tag::BAD_FREE,
            (Self::DoubleFree, FreeOutcome::NoSignal) => tag::DF_ATTEMPT,
            (Self::FakeFree, FreeOutcome::NoSignal) => tag::FF_ATTEMPT,
        }
    }
}

/// In-process bookkeeping returned by every scenario run. Not a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub allocator: String,
    pub scenario: ScenarioKind,
    pub alloc_count: u64,
    pub free_count: u64,
    pub high_watermark_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultReason>,
    /// UseAfterFree only: whether the stale marker showed up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leak_detected: Option<bool>,
}

/// One scenario's exclusive view of the probe, clock and emitter.
pub struct Session<'a> {
    probe: &'a mut dyn AllocatorProbe,
    clock: &'a dyn ClockSource,
    telemetry: &'a mut Telemetry,
    params: &'a ScenarioParams,
    ctx: RunContext,
    fault: Option<FaultReason>,
    leak_detected: Option<bool>,
}

impl<'a> Session<'a> {
    /// Start a session with fresh counters and peak.
    pub fn new(
        probe: &'a mut dyn AllocatorProbe,
        clock: &'a dyn ClockSource,
        telemetry: &'a mut Telemetry,
        params: &'a ScenarioParams,
    ) -> Self {
        Self {
            probe,
            clock,
            telemetry,
            params,
            ctx: RunContext::new(),
            fault: None,
            leak_detected: None,
        }
    }

    #[must_use]
    pub fn params(&self) -> &ScenarioParams {
        self.params
    }

    #[must_use]
    pub fn context(&self) -> RunContext {
        self.ctx
    }

    /// Upper bound the backend gives for simultaneous `size`-byte blocks.
    #[must_use]
    pub fn max_allocations(&self, size: usize) -> usize {
        self.probe.max_allocations(size)
    }

    /// Timed allocation. Emits `OK` or `NULL`.
    pub fn alloc(&mut self, phase: &str, size: usize) -> Option<AllocationHandle> {
        let tick_in = self.clock.now();
        let handle = self.probe.allocate(size);
        let tick_out = self.clock.now();

        let result = if handle.is_some() {
            self.ctx.alloc_count += 1;
            tag::OK
        } else {
            tag::NULL
        };
        let span = TickSpan { tick_in, tick_out };
        self.telemetry
            .time(&self.ctx, phase, "malloc", size, span, result);
        handle
    }

    /// Timed free. Counted as an attempt whatever the backend does.
    pub fn free(
        &mut self,
        phase: &str,
        handle: AllocationHandle,
        size: usize,
        intent: FreeIntent,
    ) -> FreeOutcome {
        let tick_in = self.clock.now();
        let outcome = self.probe.free(handle);
        let tick_out = self.clock.now();

        self.ctx.free_count += 1;
        let span = TickSpan { tick_in, tick_out };
        self.telemetry
            .time(&self.ctx, phase, "free", size, span, intent.tag(outcome));
        outcome
    }

    /// Free every handle, last allocated first, leaving `handles` empty.
    pub fn release_lifo(&mut self, phase: &str, handles: &mut Vec<AllocationHandle>, size: usize) {
        while let Some(handle) = handles.pop() {
            self.free(phase, handle, size, FreeIntent::Release);
        }
    }

    /// Free every handle in allocation order.
    pub fn release_fifo(&mut self, phase: &str, handles: Vec<AllocationHandle>, size: usize) {
        for handle in handles {
            self.free(phase, handle, size, FreeIntent::Release);
        }
    }

    /// Untimed pattern write through the probe.
    pub fn fill(&mut self, handle: AllocationHandle, len: usize, byte: u8) -> usize {
        self.probe.write_bytes(handle, len, byte)
    }

    /// Timed pattern write, reported with `op` and `result`.
    pub fn timed_write(
        &mut self,
        phase: &str,
        op: &str,
        handle: AllocationHandle,
        len: usize,
        byte: u8,
        result: &str,
    ) -> usize {
        let tick_in = self.clock.now();
        let written = self.probe.write_bytes(handle, len, byte);
        let tick_out = self.clock.now();

        let span = TickSpan { tick_in, tick_out };
        self.telemetry.time(&self.ctx, phase, op, len, span, result);
        written
    }

    /// Scan `len` bytes at `handle` for `marker` and report the verdict.
    ///
    /// Emits a `TIME` record tagged `LEAK_DETECTED` or `NO_LEAK_DETECTED`,
    /// then `LEAK` or `NOLEAK` with the handle's address.
    pub fn inspect(&mut self, phase: &str, handle: AllocationHandle, len: usize, marker: u8) -> bool {
        let tick_in = self.clock.now();
        let leaked = self.probe.read_bytes(handle, len).contains(&marker);
        let tick_out = self.clock.now();

        let result = if leaked {
            tag::LEAK_DETECTED
        } else {
            tag::NO_LEAK_DETECTED
        };
        let span = TickSpan { tick_in, tick_out };
        self.telemetry
            .time(&self.ctx, phase, "inspect_uaf", len, span, result);
        if leaked {
            self.telemetry.leak(handle);
        } else {
            self.telemetry.no_leak(handle);
        }
        self.leak_detected = Some(leaked);
        leaked
    }

    /// Query the probe and emit `SNAP`.
    pub fn snapshot(&mut self, phase: &str) {
        let usage = self.probe.query_usage();
        self.telemetry.snapshot(&mut self.ctx, phase, usage);
    }

    /// Emit `FAULT` at the current tick. The first reason is kept for the summary.
    pub fn fault(&mut self, reason: FaultReason) {
        let tick = self.clock.now();
        self.telemetry.fault(tick, reason);
        self.fault.get_or_insert(reason);
    }

    fn into_summary(self, allocator: String, scenario: ScenarioKind) -> ScenarioSummary {
        ScenarioSummary {
            allocator,
            scenario,
            alloc_count: self.ctx.alloc_count,
            free_count: self.ctx.free_count,
            high_watermark_bytes: self.ctx.high_watermark_bytes,
            fault: self.fault,
            leak_detected: self.leak_detected,
        }
    }
}

/// Run one scenario inside its banner pair.
pub fn run_scenario(
    kind: ScenarioKind,
    probe: &mut dyn AllocatorProbe,
    clock: &dyn ClockSource,
    telemetry: &mut Telemetry,
    params: &ScenarioParams,
) -> ScenarioSummary {
    let allocator = probe.name().to_string();
    telemetry.start(&allocator, kind.as_str());
    telemetry.meta(clock.tick_hz());

    let mut session = Session::new(probe, clock, telemetry, params);
    session.snapshot("baseline");
    match kind {
        ScenarioKind::DoubleFree => double_free::run(&mut session),
        ScenarioKind::FakeFree => fake_free::run(&mut session),
        ScenarioKind::HeapOverflow => heap_overflow::run(&mut session),
        ScenarioKind::LeakExhaust => leak_exhaust::run(&mut session),
        ScenarioKind::MixedLifetime => mixed_lifetime::run(&mut session),
        ScenarioKind::UseAfterFree => use_after_free::run(&mut session),
        ScenarioKind::BurstMalloc => burst_malloc::run(&mut session),
    }
    session.snapshot("post_cleanup");
    let summary = session.into_summary(allocator, kind);

    telemetry.end(&summary.allocator, kind.as_str());
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_names_parse_loosely() {
        assert_eq!(ScenarioKind::from_str_loose("double-free"), Some(ScenarioKind::DoubleFree));
        assert_eq!(ScenarioKind::from_str_loose("USE_AFTER_FREE"), Some(ScenarioKind::UseAfterFree));
        assert_eq!(ScenarioKind::from_str_loose("hof"), Some(ScenarioKind::HeapOverflow));
        assert_eq!(ScenarioKind::from_str_loose("fragment"), None);
        for kind in ScenarioKind::ALL {
            assert_eq!(ScenarioKind::from_str_loose(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn release_tags() {
        assert_eq!(FreeIntent::Release.tag(FreeOutcome::Ok), "OK");
        assert_eq!(FreeIntent::Release.tag(FreeOutcome::NoSignal), "OK");
        assert_eq!(FreeIntent::Release.tag(FreeOutcome::ErrorReported), "ERR");
    }

    #[test]
    fn misuse_tags() {
        assert_eq!(FreeIntent::DoubleFree.tag(FreeOutcome::Ok), "OK");
        assert_eq!(FreeIntent::DoubleFree.tag(FreeOutcome::ErrorReported), "BAD_FREE");
        assert_eq!(FreeIntent::DoubleFree.tag(FreeOutcome::NoSignal), "DF_ATTEMPT");
        assert_eq!(FreeIntent::FakeFree.tag(FreeOutcome::ErrorReported), "BAD_FREE");
        assert_eq!(FreeIntent::FakeFree.tag(FreeOutcome::NoSignal), "FF_ATTEMPT");
    }

    #[test]
    fn summary_omits_absent_fields() {
        let summary = ScenarioSummary {
            allocator: "pool".into(),
            scenario: ScenarioKind::BurstMalloc,
            alloc_count: 100,
            free_count: 100,
            high_watermark_bytes: 1280,
            fault: None,
            leak_detected: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["scenario"], "BurstMalloc");
        assert!(json.get("fault").is_none());
        assert!(json.get("leak_detected").is_none());
    }
}
