//! Fault-injection harness for allocator backends.
//!
//! This crate provides:
//! - Wire protocol: the line records every run emits
//! - Telemetry emitter: per-record flush, per-run counters and peak
//! - Scenario engine: the fixed misuse catalog driven through a probe
//! - Runner: backend construction and job expansion
//! - Capture tooling: banner extraction, CSV conversion, stream validation
//! - Structured JSONL run log with a SHA-256 artifact index

#![forbid(unsafe_code)]

pub mod capture;
pub mod config;
pub mod error;
pub mod runner;
pub mod scenario;
pub mod structured_log;
pub mod telemetry;
pub mod wire;

pub use config::{HarnessConfig, ScenarioParams};
pub use error::{HarnessError, WireError};
pub use runner::{Job, RunSummary, ScenarioRunner, expand_jobs};
pub use scenario::{ScenarioKind, ScenarioSummary, run_scenario};
pub use telemetry::{RunContext, SharedBuffer, Telemetry};
pub use wire::{EventRecord, FaultReason, LineEnding};
