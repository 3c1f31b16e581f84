//! Telemetry emitter.
//!
//! Formats records onto a character transport. Every record is written and
//! flushed before the caller proceeds, so the log order is the real order of
//! observations even if the process dies right after a line. Delivery is
//! fire-and-forget: transport errors are counted, never returned.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use heapscope_core::{AllocationHandle, UsageSnapshot};
use parking_lot::Mutex;

use crate::wire::{EventRecord, FaultReason, LineEnding, TimeRecord};

/// Per-run counters and peak, owned by the scenario that is running.
///
/// Created fresh at scenario entry and never shared between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunContext {
    /// Successful allocations so far.
    pub alloc_count: u64,
    /// Free attempts so far, legal or not.
    pub free_count: u64,
    /// Peak `allocated_bytes` seen by any snapshot this run.
    pub high_watermark_bytes: usize,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a reading into the peak and return it with the run-wide watermark.
    pub fn observe(&mut self, usage: UsageSnapshot) -> UsageSnapshot {
        self.high_watermark_bytes = self.high_watermark_bytes.max(usage.allocated_bytes);
        usage.with_watermark(self.high_watermark_bytes)
    }
}

/// Tick readings taken immediately before and after a probe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSpan {
    pub tick_in: u64,
    pub tick_out: u64,
}

/// Writes wire records to a transport.
pub struct Telemetry {
    writer: Box<dyn Write>,
    line_ending: LineEnding,
    records: u64,
    transport_errors: u64,
}

impl Telemetry {
    #[must_use]
    pub fn new(writer: impl Write + 'static, line_ending: LineEnding) -> Self {
        Self {
            writer: Box::new(writer),
            line_ending,
            records: 0,
            transport_errors: 0,
        }
    }

    /// Emitter that writes to a file.
    pub fn to_file(path: &Path, line_ending: LineEnding) -> io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(io::BufWriter::new(file), line_ending))
    }

    /// Emitter that discards everything (for benchmarks).
    #[must_use]
    pub fn sink() -> Self {
        Self::new(io::sink(), LineEnding::Lf)
    }

    /// Records emitted so far, including ones the transport dropped.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Records whose write or flush failed.
    #[must_use]
    pub fn transport_errors(&self) -> u64 {
        self.transport_errors
    }

    /// Write one record and flush it.
    pub fn emit(&mut self, record: &EventRecord) {
        self.records += 1;
        let line = format!("{record}{}", self.line_ending.as_str());
        let delivered = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush());
        if delivered.is_err() {
            self.transport_errors += 1;
        }
    }

    pub fn start(&mut self, allocator: &str, scenario: &str) {
        self.emit(&EventRecord::Start {
            allocator: allocator.to_string(),
            scenario: scenario.to_string(),
        });
    }

    pub fn end(&mut self, allocator: &str, scenario: &str) {
        self.emit(&EventRecord::End {
            allocator: allocator.to_string(),
            scenario: scenario.to_string(),
        });
    }

    pub fn meta(&mut self, tick_hz: u32) {
        self.emit(&EventRecord::Meta { tick_hz });
    }

    /// Emit a `TIME` record stamped with the run's current counters.
    pub fn time(
        &mut self,
        ctx: &RunContext,
        phase: &str,
        op: &str,
        size: usize,
        span: TickSpan,
        result: &str,
    ) {
        self.emit(&EventRecord::Time(TimeRecord {
            phase: phase.to_string(),
            op: op.to_string(),
            size,
            tick_in: span.tick_in,
            tick_out: span.tick_out,
            result: result.to_string(),
            alloc_count: ctx.alloc_count,
            free_count: ctx.free_count,
        }));
    }

    /// Update the run peak from `usage`, then emit a `SNAP` record.
    pub fn snapshot(
        &mut self,
        ctx: &mut RunContext,
        phase: &str,
        usage: UsageSnapshot,
    ) -> UsageSnapshot {
        let usage = ctx.observe(usage);
        self.emit(&EventRecord::Snapshot {
            phase: phase.to_string(),
            free_bytes: usage.free_bytes,
            allocated_bytes: usage.allocated_bytes,
            high_watermark_bytes: usage.high_watermark_bytes,
        });
        usage
    }

    pub fn fault(&mut self, tick: u64, reason: FaultReason) {
        self.emit(&EventRecord::Fault {
            tick,
            reason: reason.as_str().to_string(),
        });
    }

    pub fn leak(&mut self, handle: AllocationHandle) {
        self.emit(&EventRecord::Leak {
            address: handle.addr(),
        });
    }

    pub fn no_leak(&mut self, handle: AllocationHandle) {
        self.emit(&EventRecord::NoLeak {
            address: handle.addr(),
        });
    }
}

/// Cloneable in-memory transport. Every clone appends to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    /// Everything written so far, as text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
