//! Scenario execution engine.

use std::io::Write;
use std::time::Instant;

use heapscope_core::{BackendKind, ClockSource, MonotonicClock, SteppingClock, build_probe};
use serde::Serialize;

use crate::config::HarnessConfig;
use crate::scenario::{ScenarioKind, ScenarioSummary, run_scenario};
use crate::telemetry::{SharedBuffer, Telemetry};

/// One (backend, scenario) pair to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Job {
    pub backend: BackendKind,
    pub scenario: ScenarioKind,
}

/// Expand optional filters into jobs. `None` selects the whole catalog.
///
/// Ordered backend-major, each list in catalog order.
#[must_use]
pub fn expand_jobs(backend: Option<BackendKind>, scenario: Option<ScenarioKind>) -> Vec<Job> {
    let backends: Vec<BackendKind> = backend.map_or_else(|| BackendKind::ALL.to_vec(), |b| vec![b]);
    let scenarios: Vec<ScenarioKind> =
        scenario.map_or_else(|| ScenarioKind::ALL.to_vec(), |s| vec![s]);

    backends
        .iter()
        .flat_map(|&backend| {
            scenarios
                .iter()
                .map(move |&scenario| Job { backend, scenario })
        })
        .collect()
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub backend: BackendKind,
    pub summary: ScenarioSummary,
    /// Wire records emitted, banners included.
    pub records: u64,
    /// Records the transport failed to take.
    pub transport_errors: u64,
    /// Host wall time for the whole run.
    pub duration_ms: u64,
}

/// Builds a fresh backend per run and wires it to a clock and emitter.
pub struct ScenarioRunner {
    config: HarnessConfig,
    deterministic: bool,
}

impl ScenarioRunner {
    /// Create a new runner.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            deterministic: false,
        }
    }

    /// Use a stepping clock so repeated runs produce identical bytes.
    #[must_use]
    pub fn deterministic(mut self, on: bool) -> Self {
        self.deterministic = on;
        self
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Banner name for `backend`: the configured override, else its short name.
    #[must_use]
    pub fn allocator_name(&self, backend: BackendKind) -> String {
        self.config
            .allocator_name
            .clone()
            .unwrap_or_else(|| backend.as_str().to_string())
    }

    fn clock(&self) -> Box<dyn ClockSource> {
        if self.deterministic {
            Box::new(SteppingClock::new(0, 1, self.config.tick_hz))
        } else {
            Box::new(MonotonicClock::new(self.config.tick_hz))
        }
    }

    /// Run one job, streaming the wire records into `writer`.
    pub fn run(&self, job: Job, writer: impl Write + 'static) -> RunSummary {
        let mut telemetry = Telemetry::new(writer, self.config.line_ending);
        self.run_with(job, &mut telemetry)
    }

    /// Run one job on an existing emitter.
    pub fn run_with(&self, job: Job, telemetry: &mut Telemetry) -> RunSummary {
        let started = Instant::now();
        let records_before = telemetry.records();
        let errors_before = telemetry.transport_errors();

        let name = self.allocator_name(job.backend);
        let mut probe = build_probe(job.backend, &name, &self.config.backend);
        let clock = self.clock();
        let summary = run_scenario(
            job.scenario,
            probe.as_mut(),
            clock.as_ref(),
            telemetry,
            &self.config.scenario,
        );

        RunSummary {
            backend: job.backend,
            summary,
            records: telemetry.records() - records_before,
            transport_errors: telemetry.transport_errors() - errors_before,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Run one job into memory and return the captured stream.
    pub fn run_captured(&self, job: Job) -> (RunSummary, String) {
        let buffer = SharedBuffer::new();
        let summary = self.run(job, buffer.clone());
        (summary, buffer.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_matrix_is_backend_major() {
        let jobs = expand_jobs(None, None);
        assert_eq!(jobs.len(), BackendKind::ALL.len() * ScenarioKind::ALL.len());
        assert_eq!(
            jobs[0],
            Job {
                backend: BackendKind::GeneralHeap,
                scenario: ScenarioKind::DoubleFree
            }
        );
        assert_eq!(jobs[ScenarioKind::ALL.len()].backend, BackendKind::FixedBlockPool);
    }

    #[test]
    fn filters_narrow_the_matrix() {
        let jobs = expand_jobs(Some(BackendKind::StaticArena), None);
        assert_eq!(jobs.len(), ScenarioKind::ALL.len());
        assert!(jobs.iter().all(|j| j.backend == BackendKind::StaticArena));

        let jobs = expand_jobs(None, Some(ScenarioKind::UseAfterFree));
        assert_eq!(jobs.len(), BackendKind::ALL.len());

        let jobs = expand_jobs(Some(BackendKind::GeneralHeap), Some(ScenarioKind::LeakExhaust));
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn allocator_name_override_reaches_banner() {
        let config = HarnessConfig {
            allocator_name: Some("newlib-nano".into()),
            ..HarnessConfig::default()
        };
        let runner = ScenarioRunner::new(config).deterministic(true);
        let job = Job {
            backend: BackendKind::GeneralHeap,
            scenario: ScenarioKind::DoubleFree,
        };
        let (summary, text) = runner.run_captured(job);
        assert_eq!(summary.summary.allocator, "newlib-nano");
        assert!(text.starts_with("# newlib-nano DoubleFree start\n"), "{text}");
        assert!(text.ends_with("# newlib-nano DoubleFree end\n"), "{text}");
    }

    #[test]
    fn record_count_matches_stream() {
        let runner = ScenarioRunner::new(HarnessConfig::default()).deterministic(true);
        let job = Job {
            backend: BackendKind::FixedBlockPool,
            scenario: ScenarioKind::FakeFree,
        };
        let (summary, text) = runner.run_captured(job);
        assert_eq!(summary.records, text.lines().count() as u64);
        assert_eq!(summary.transport_errors, 0);
    }

    #[test]
    fn deterministic_runs_are_byte_identical() {
        let runner = ScenarioRunner::new(HarnessConfig::default()).deterministic(true);
        let job = Job {
            backend: BackendKind::SegregatedFit,
            scenario: ScenarioKind::MixedLifetime,
        };
        let (_, first) = runner.run_captured(job);
        let (_, second) = runner.run_captured(job);
        assert_eq!(first, second);
    }
}
