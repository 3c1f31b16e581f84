//! Offline tooling over captured wire streams.
//!
//! A capture may hold boot noise, several runs, and either line ending.
//! Extraction takes the lines strictly between a run's banners. CSV
//! conversion keeps only known record kinds. Validation checks the
//! structure a consumer relies on.

use std::io::Write;

use serde::Serialize;

use crate::error::HarnessError;
use crate::wire::{EventRecord, RECORD_PREFIXES};

/// The records of one run, as captured between its banners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedRun {
    pub allocator: String,
    pub scenario: String,
    /// Raw lines between the banners, terminators stripped.
    pub lines: Vec<String>,
}

/// Split a capture into runs. Noise outside banners is dropped, and a run
/// missing its end banner is dropped too.
#[must_use]
pub fn extract_runs(text: &str) -> Vec<CapturedRun> {
    let mut runs = Vec::new();
    let mut current: Option<CapturedRun> = None;

    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');
        match EventRecord::parse(line) {
            Ok(EventRecord::Start {
                allocator,
                scenario,
            }) => {
                current = Some(CapturedRun {
                    allocator,
                    scenario,
                    lines: Vec::new(),
                });
            }
            Ok(EventRecord::End {
                allocator,
                scenario,
            }) => {
                if let Some(run) = current.take()
                    && run.allocator == allocator
                    && run.scenario == scenario
                {
                    runs.push(run);
                }
            }
            _ => {
                if let Some(run) = current.as_mut()
                    && !line.trim().is_empty()
                {
                    run.lines.push(line.to_string());
                }
            }
        }
    }
    runs
}

/// First complete run, optionally restricted to one scenario name
/// (case-insensitive).
pub fn extract_run(text: &str, scenario: Option<&str>) -> Result<CapturedRun, HarnessError> {
    extract_runs(text)
        .into_iter()
        .find(|run| scenario.is_none_or(|name| run.scenario.eq_ignore_ascii_case(name)))
        .ok_or_else(|| HarnessError::MissingRun(scenario.unwrap_or("any").to_string()))
}

/// Parse a run's lines into records. Errors carry the 1-based index of the
/// offending line within `lines`.
pub fn parse_records(lines: &[String]) -> Result<Vec<EventRecord>, HarnessError> {
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            EventRecord::parse(line).map_err(|source| HarnessError::Wire {
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Comma-split rows for lines that start with a known record prefix.
#[must_use]
pub fn csv_rows(lines: &[String]) -> Vec<Vec<String>> {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.split(',')
                .next()
                .is_some_and(|prefix| RECORD_PREFIXES.contains(&prefix))
        })
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect()
}

/// Write rows as CSV. Wire fields never contain commas, so nothing is quoted.
pub fn write_csv(rows: &[Vec<String>], out: &mut dyn Write) -> std::io::Result<()> {
    for row in rows {
        writeln!(out, "{}", row.join(","))?;
    }
    Ok(())
}

/// One structural problem in a capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamViolation {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

/// Outcome of [`validate_stream`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamReport {
    pub runs: usize,
    pub records: usize,
    pub faults: usize,
    pub violations: Vec<StreamViolation>,
}

impl StreamReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug)]
struct OpenRun {
    allocator: String,
    scenario: String,
    start_line: usize,
    seen_meta: bool,
    last_counts: (u64, u64),
}

/// Check a capture: banners pair up, records sit strictly inside a run,
/// `META` leads each run, counters never decrease, every line inside a run
/// parses (including the `FAULT` sentinel).
#[must_use]
pub fn validate_stream(text: &str) -> StreamReport {
    let mut report = StreamReport::default();
    let mut open: Option<OpenRun> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let record = match EventRecord::parse(line) {
            Ok(record) => record,
            Err(err) => {
                if open.is_some() {
                    violate(&mut report, line_no, err.to_string());
                }
                continue;
            }
        };

        match record {
            EventRecord::Start {
                allocator,
                scenario,
            } => {
                if let Some(prev) = open.take() {
                    violate(
                        &mut report,
                        line_no,
                        format!(
                            "start banner inside open run '{} {}' (line {})",
                            prev.allocator, prev.scenario, prev.start_line
                        ),
                    );
                }
                open = Some(OpenRun {
                    allocator,
                    scenario,
                    start_line: line_no,
                    seen_meta: false,
                    last_counts: (0, 0),
                });
            }
            EventRecord::End {
                allocator,
                scenario,
            } => match open.take() {
                Some(run) if run.allocator == allocator && run.scenario == scenario => {
                    report.runs += 1;
                }
                Some(run) => violate(
                    &mut report,
                    line_no,
                    format!(
                        "end banner '{allocator} {scenario}' does not match start '{} {}'",
                        run.allocator, run.scenario
                    ),
                ),
                None => violate(
                    &mut report,
                    line_no,
                    format!("end banner '{allocator} {scenario}' without start"),
                ),
            },
            record => {
                let Some(run) = open.as_mut() else {
                    violate(
                        &mut report,
                        line_no,
                        format!("{} record outside banners", record.kind()),
                    );
                    continue;
                };
                report.records += 1;
                match &record {
                    EventRecord::Meta { .. } => {
                        if run.seen_meta {
                            violate(&mut report, line_no, "duplicate META".to_string());
                        }
                        run.seen_meta = true;
                    }
                    EventRecord::Time(t) => {
                        let (alloc, free) = run.last_counts;
                        if t.alloc_count < alloc || t.free_count < free {
                            violate(
                                &mut report,
                                line_no,
                                format!(
                                    "counters went backwards: ({alloc},{free}) -> ({},{})",
                                    t.alloc_count, t.free_count
                                ),
                            );
                        }
                        run.last_counts = (t.alloc_count, t.free_count);
                    }
                    EventRecord::Fault { .. } => report.faults += 1,
                    _ => {}
                }
                if !run.seen_meta {
                    violate(
                        &mut report,
                        line_no,
                        format!("{} record before META", record.kind()),
                    );
                    // Report once per run.
                    run.seen_meta = true;
                }
            }
        }
    }

    if let Some(run) = open {
        violate(
            &mut report,
            run.start_line,
            format!("run '{} {}' has no end banner", run.allocator, run.scenario),
        );
    }
    if report.runs == 0 && report.violations.is_empty() {
        violate(&mut report, 0, "no runs found".to_string());
    }
    report
}

fn violate(report: &mut StreamReport, line: usize, message: String) {
    report.violations.push(StreamViolation { line, message });
}
