//! CLI entrypoint for the heapscope harness.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use heapscope_core::BackendKind;
use heapscope_harness::capture::{csv_rows, extract_run, validate_stream, write_csv};
use heapscope_harness::structured_log::{
    ArtifactIndex, LogEmitter, LogEntry, LogLevel, RunOutcome, validate_log_file,
};
use heapscope_harness::{
    HarnessConfig, HarnessError, Job, RunSummary, ScenarioKind, ScenarioRunner, Telemetry,
    expand_jobs,
};

/// Allocator misuse harness.
#[derive(Debug, Parser)]
#[command(name = "heapscope-harness")]
#[command(about = "Run allocator misuse scenarios and process their telemetry")]
struct Cli {
    /// More progress output (repeat for per-run detail).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Only warnings and errors on stderr.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

/// How much progress goes to stderr. Wire output and warnings are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, _) => Self::Verbose,
        }
    }

    fn shows(self, at: Self) -> bool {
        self >= at
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one scenario against one backend and stream the wire records.
    Run {
        /// Backend (heap, pool, segfit, arena).
        #[arg(long)]
        backend: String,
        /// Scenario (e.g. DoubleFree, uaf, burst).
        #[arg(long)]
        scenario: String,
        /// Config JSON path (falls back to HEAPSCOPE_CONFIG).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Wire output path (if omitted, writes to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Structured JSONL run log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Use a stepping clock for byte-identical output.
        #[arg(long)]
        deterministic: bool,
    },
    /// Run every selected backend x scenario pair into an output directory.
    Matrix {
        /// Restrict to one backend (default: all).
        #[arg(long)]
        backend: Option<String>,
        /// Restrict to one scenario (default: all).
        #[arg(long)]
        scenario: Option<String>,
        /// Output directory for logs, CSVs, run log and artifact index.
        #[arg(long)]
        out_dir: PathBuf,
        /// Config JSON path (falls back to HEAPSCOPE_CONFIG).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Use a stepping clock for byte-identical output.
        #[arg(long)]
        deterministic: bool,
        /// Run identifier used in trace ids (default: derived from the clock).
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Extract one run from a captured log and write its records as CSV.
    ToCsv {
        /// Captured wire log.
        #[arg(long)]
        input: PathBuf,
        /// Scenario whose run to extract (default: first complete run).
        #[arg(long)]
        scenario: Option<String>,
        /// Output CSV path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check the structure of a captured log and/or a JSONL run log.
    Validate {
        /// Captured wire log.
        #[arg(long, required_unless_present = "run_log")]
        input: Option<PathBuf>,
        /// Structured run log (e.g. `run_log.jsonl` from `matrix`).
        #[arg(long)]
        run_log: Option<PathBuf>,
    },
    /// List backends and scenarios.
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);

    match cli.command {
        Command::Run {
            backend,
            scenario,
            config,
            output,
            log,
            deterministic,
        } => {
            let job = Job {
                backend: parse_backend(&backend)?,
                scenario: parse_scenario(&scenario)?,
            };
            let config = HarnessConfig::load(config.as_deref())?;
            let line_ending = config.line_ending;
            let runner = ScenarioRunner::new(config).deterministic(deterministic);

            let mut telemetry = match &output {
                Some(path) => {
                    ensure_parent(path)?;
                    Telemetry::to_file(path, line_ending)?
                }
                None => Telemetry::new(std::io::stdout(), line_ending),
            };
            if verbosity.shows(Verbosity::Verbose) {
                eprintln!(
                    "Running {} {} as '{}'",
                    job.backend,
                    job.scenario,
                    runner.allocator_name(job.backend)
                );
            }
            let result = runner.run_with(job, &mut telemetry);
            if let Some(path) = &output
                && verbosity.shows(Verbosity::Normal)
            {
                eprintln!("Wrote {} records to {}", result.records, path.display());
            }
            report_transport(&result);

            if let Some(log_path) = log {
                ensure_parent(&log_path)?;
                let mut emitter = LogEmitter::to_file(&log_path, &default_run_id(deterministic))?;
                emitter.emit_entry(run_entry(&result, output.as_deref()))?;
                emitter.flush()?;
            }
        }
        Command::Matrix {
            backend,
            scenario,
            out_dir,
            config,
            deterministic,
            run_id,
        } => {
            let backend = backend.as_deref().map(parse_backend).transpose()?;
            let scenario = scenario.as_deref().map(parse_scenario).transpose()?;
            let jobs = expand_jobs(backend, scenario);
            let config = HarnessConfig::load(config.as_deref())?;
            let runner = ScenarioRunner::new(config).deterministic(deterministic);
            let run_id = run_id.unwrap_or_else(|| default_run_id(deterministic));

            std::fs::create_dir_all(&out_dir)?;
            let log_path = out_dir.join("run_log.jsonl");
            let mut emitter = LogEmitter::to_file(&log_path, &run_id)?;
            let mut index = ArtifactIndex::new(&run_id);
            emitter.emit_entry(
                LogEntry::new("", LogLevel::Info, "matrix_start")
                    .with_details(serde_json::json!({ "jobs": jobs.len() })),
            )?;

            if verbosity.shows(Verbosity::Normal) {
                eprintln!("Running {} job(s) into {}", jobs.len(), out_dir.display());
            }
            let mut faulted = 0usize;
            for job in &jobs {
                let (result, text) = runner.run_captured(*job);
                let dir = out_dir.join(job.backend.as_str());
                std::fs::create_dir_all(&dir)?;

                let log_rel = format!("{}/{}.log", job.backend, job.scenario);
                let csv_rel = format!("{}/{}.csv", job.backend, job.scenario);
                let log_file = out_dir.join(&log_rel);
                let csv_file = out_dir.join(&csv_rel);
                std::fs::write(&log_file, &text)?;

                let run = extract_run(&text, Some(job.scenario.as_str()))?;
                let mut csv = Vec::new();
                write_csv(&csv_rows(&run.lines), &mut csv)?;
                std::fs::write(&csv_file, csv)?;

                index.add_file(&log_file, log_rel.clone(), "wire_log")?;
                index.add_file(&csv_file, csv_rel.clone(), "wire_csv")?;

                if result.summary.fault.is_some() {
                    faulted += 1;
                }
                if verbosity.shows(Verbosity::Normal) {
                    eprintln!(
                        "[{} {}] records={} allocs={} frees={} peak={}{}",
                        job.backend,
                        job.scenario,
                        result.records,
                        result.summary.alloc_count,
                        result.summary.free_count,
                        result.summary.high_watermark_bytes,
                        result
                            .summary
                            .fault
                            .map(|f| format!(" fault={f}"))
                            .unwrap_or_default(),
                    );
                }
                if verbosity.shows(Verbosity::Verbose) {
                    eprintln!(
                        "  allocator='{}' duration_ms={} wrote {log_rel}, {csv_rel}",
                        result.summary.allocator, result.duration_ms
                    );
                }
                report_transport(&result);
                emitter.emit_entry(
                    run_entry(&result, None).with_artifacts(vec![log_rel, csv_rel]),
                )?;
            }

            emitter.emit_entry(
                LogEntry::new("", LogLevel::Info, "matrix_end").with_details(serde_json::json!({
                    "jobs": jobs.len(),
                    "faulted": faulted,
                })),
            )?;
            emitter.flush()?;

            index.add_file(&log_path, "run_log.jsonl", "run_log")?;
            let index_path = out_dir.join("artifact_index.json");
            std::fs::write(&index_path, index.to_json()?)?;
            if verbosity.shows(Verbosity::Normal) {
                eprintln!(
                    "Matrix complete: jobs={}, faulted={faulted}; index at {}",
                    jobs.len(),
                    index_path.display()
                );
            }
        }
        Command::ToCsv {
            input,
            scenario,
            output,
        } => {
            let text = std::fs::read_to_string(&input)?;
            let run = extract_run(&text, scenario.as_deref())?;
            let rows = csv_rows(&run.lines);
            if verbosity.shows(Verbosity::Normal) {
                eprintln!(
                    "Extracted {} row(s) for '{} {}'",
                    rows.len(),
                    run.allocator,
                    run.scenario
                );
            }

            let mut body = Vec::new();
            write_csv(&rows, &mut body)?;
            if let Some(path) = output {
                ensure_parent(&path)?;
                std::fs::write(&path, body)?;
                if verbosity.shows(Verbosity::Normal) {
                    eprintln!("Wrote CSV to {}", path.display());
                }
            } else {
                print!("{}", String::from_utf8_lossy(&body));
            }
        }
        Command::Validate { input, run_log } => {
            let mut failures = Vec::new();
            if let Some(input) = input {
                let text = std::fs::read_to_string(&input)?;
                let report = validate_stream(&text);
                println!("{}", serde_json::to_string_pretty(&report)?);
                if report.is_ok() {
                    if verbosity.shows(Verbosity::Normal) {
                        eprintln!(
                            "Stream OK: runs={}, records={}, faults={}",
                            report.runs, report.records, report.faults
                        );
                    }
                } else {
                    failures.push(format!(
                        "stream validation failed: {} violation(s)",
                        report.violations.len()
                    ));
                }
            }
            if let Some(path) = run_log {
                let (lines, errors) = validate_log_file(&path)?;
                for error in &errors {
                    eprintln!("{}: {error}", path.display());
                }
                if errors.is_empty() {
                    if verbosity.shows(Verbosity::Normal) {
                        eprintln!("Run log OK: {lines} entries in {}", path.display());
                    }
                } else {
                    failures.push(format!(
                        "run log validation failed: {} error(s) in {lines} entries",
                        errors.len()
                    ));
                }
            }
            if !failures.is_empty() {
                return Err(failures.join("; ").into());
            }
        }
        Command::List => {
            println!("backends:");
            for kind in BackendKind::ALL {
                let free = if kind.reports_free_errors() {
                    "error-code free"
                } else {
                    "void free"
                };
                println!("  {:<8} {free}", kind.as_str());
            }
            println!("scenarios:");
            for kind in ScenarioKind::ALL {
                println!("  {:<14} {}", kind.as_str(), kind.description());
            }
        }
    }

    Ok(())
}

fn parse_backend(raw: &str) -> Result<BackendKind, HarnessError> {
    BackendKind::from_str_loose(raw).ok_or_else(|| HarnessError::UnknownBackend(raw.to_string()))
}

fn parse_scenario(raw: &str) -> Result<ScenarioKind, HarnessError> {
    ScenarioKind::from_str_loose(raw).ok_or_else(|| HarnessError::UnknownScenario(raw.to_string()))
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn default_run_id(deterministic: bool) -> String {
    if deterministic {
        return "deterministic".to_string();
    }
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("run-{secs}")
}

fn run_entry(result: &RunSummary, artifact: Option<&Path>) -> LogEntry {
    let summary = &result.summary;
    let outcome = RunOutcome::of(summary);
    let level = if result.transport_errors > 0 {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };
    let mut entry = LogEntry::new("", level, "scenario_end")
        .with_backend(result.backend.as_str())
        .with_scenario(summary.scenario.as_str())
        .with_outcome(outcome)
        .with_records(result.records)
        .with_duration_ms(result.duration_ms)
        .with_details(serde_json::json!({
            "allocator": summary.allocator,
            "alloc_count": summary.alloc_count,
            "free_count": summary.free_count,
            "high_watermark_bytes": summary.high_watermark_bytes,
            "fault": summary.fault,
            "leak_detected": summary.leak_detected,
            "transport_errors": result.transport_errors,
        }));
    if let Some(path) = artifact {
        entry = entry.with_artifacts(vec![path.display().to_string()]);
    }
    entry
}

fn report_transport(result: &RunSummary) {
    if result.transport_errors > 0 {
        eprintln!(
            "warning: {} of {} record(s) were not delivered",
            result.transport_errors, result.records
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_flags_are_global() {
        let cli = Cli::try_parse_from(["heapscope-harness", "list", "-vv"]).unwrap();
        assert_eq!(Verbosity::from_flags(cli.quiet, cli.verbose), Verbosity::Verbose);

        let cli = Cli::try_parse_from(["heapscope-harness", "-q", "list"]).unwrap();
        let quiet = Verbosity::from_flags(cli.quiet, cli.verbose);
        assert_eq!(quiet, Verbosity::Quiet);
        assert!(!quiet.shows(Verbosity::Normal));

        let cli = Cli::try_parse_from(["heapscope-harness", "list"]).unwrap();
        let normal = Verbosity::from_flags(cli.quiet, cli.verbose);
        assert!(normal.shows(Verbosity::Normal));
        assert!(!normal.shows(Verbosity::Verbose));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["heapscope-harness", "-q", "-v", "list"]).is_err());
    }

    #[test]
    fn validate_needs_a_wire_log_or_a_run_log() {
        assert!(Cli::try_parse_from(["heapscope-harness", "validate"]).is_err());
        let cli =
            Cli::try_parse_from(["heapscope-harness", "validate", "--run-log", "run_log.jsonl"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Validate {
                input: None,
                run_log: Some(_)
            }
        ));
    }
}
