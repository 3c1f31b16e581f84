//! Error types for harness tooling.
//!
//! Scenario steps never fail: allocator misbehaviour is recorded as telemetry.
//! These errors cover everything around a run (config, files, capture parsing).

use std::path::PathBuf;

use thiserror::Error;

/// A wire line that does not match the record grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("empty record")]
    Empty,
    #[error("unknown record kind '{0}'")]
    UnknownKind(String),
    #[error("{kind} record expects {expected} fields, found {found}")]
    FieldCount {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("field '{field}' is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("fault sentinel must be 0xDEAD, found '{0}'")]
    BadSentinel(String),
    #[error("malformed banner '{0}'")]
    BadBanner(String),
    #[error("META key must be tick_hz, found '{0}'")]
    BadMetaKey(String),
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed reading config {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: Box<HarnessError>,
    },
    #[error("line {line}: {source}")]
    Wire {
        line: usize,
        #[source]
        source: WireError,
    },
    #[error("no '{0}' run found between banners")]
    MissingRun(String),
}
