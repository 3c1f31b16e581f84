//! Line-oriented telemetry records.
//!
//! ```text
//! # <allocator> <scenario> start
//! META,tick_hz,<uint>
//! SNAP,<phase>,<free_bytes>,<allocated_bytes>,<high_watermark_bytes>
//! TIME,<phase>,<op>,<size>,<tick_in>,<tick_out>,<result_tag>,<alloc_count>,<free_count>
//! FAULT,<tick>,0xDEAD,<reason>
//! LEAK,<address>
//! NOLEAK,<address>
//! # <allocator> <scenario> end
//! ```
//!
//! Fields are positional. Consumers must not rely on names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Literal marker in every `FAULT` line.
pub const FAULT_SENTINEL: &str = "0xDEAD";

/// Leading token of every non-banner record kind.
pub const RECORD_PREFIXES: [&str; 6] = ["META", "SNAP", "TIME", "FAULT", "LEAK", "NOLEAK"];

/// Result tags written in the `result_tag` field of `TIME` records.
pub mod tag {
    pub const OK: &str = "OK";
    pub const NULL: &str = "NULL";
    pub const ERR: &str = "ERR";
    pub const BAD_FREE: &str = "BAD_FREE";
    pub const DF_ATTEMPT: &str = "DF_ATTEMPT";
    pub const FF_ATTEMPT: &str = "FF_ATTEMPT";
    pub const HOF_WRITE_DONE: &str = "HOF_WRITE_DONE";
    pub const UAF_WRITE_DONE: &str = "UAF_WRITE_DONE";
    pub const LEAK_DETECTED: &str = "LEAK_DETECTED";
    pub const NO_LEAK_DETECTED: &str = "NO_LEAK_DETECTED";
}

/// Why a scenario stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FaultReason {
    /// The backend returned no handle.
    Oom,
    /// LeakExhaust hit its allocation guard without a failure.
    Limit,
}

impl FaultReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oom => "OOM",
            Self::Limit => "LIMIT",
        }
    }
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record terminator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    /// Serial-console style `\r\n`.
    CrLf,
}

impl LineEnding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }

    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lf" | "unix" | "\n" => Some(Self::Lf),
            "crlf" | "serial" | "dos" | "\r\n" => Some(Self::CrLf),
            _ => None,
        }
    }
}

/// One timed probe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecord {
    pub phase: String,
    pub op: String,
    pub size: usize,
    pub tick_in: u64,
    pub tick_out: u64,
    pub result: String,
    pub alloc_count: u64,
    pub free_count: u64,
}

/// A single wire record. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventRecord {
    Start { allocator: String, scenario: String },
    End { allocator: String, scenario: String },
    Meta { tick_hz: u32 },
    Snapshot {
        phase: String,
        free_bytes: usize,
        allocated_bytes: usize,
        high_watermark_bytes: usize,
    },
    Time(TimeRecord),
    Fault { tick: u64, reason: String },
    Leak { address: usize },
    NoLeak { address: usize },
}

impl EventRecord {
    /// Leading token: `#` for banners, otherwise the record prefix.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } | Self::End { .. } => "#",
            Self::Meta { .. } => "META",
            Self::Snapshot { .. } => "SNAP",
            Self::Time(_) => "TIME",
            Self::Fault { .. } => "FAULT",
            Self::Leak { .. } => "LEAK",
            Self::NoLeak { .. } => "NOLEAK",
        }
    }

    #[must_use]
    pub fn is_banner(&self) -> bool {
        matches!(self, Self::Start { .. } | Self::End { .. })
    }

    /// Parse one line. A trailing `\n` or `\r\n` is accepted.
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(WireError::Empty);
        }
        if line.starts_with('#') {
            return parse_banner(line);
        }

        let fields: Vec<&str> = line.split(',').collect();
        match fields[0] {
            "META" => {
                expect_fields("META", &fields, 3)?;
                if fields[1] != "tick_hz" {
                    return Err(WireError::BadMetaKey(fields[1].to_string()));
                }
                Ok(Self::Meta {
                    tick_hz: parse_num("tick_hz", fields[2])?,
                })
            }
            "SNAP" => {
                expect_fields("SNAP", &fields, 5)?;
                Ok(Self::Snapshot {
                    phase: fields[1].to_string(),
                    free_bytes: parse_num("free_bytes", fields[2])?,
                    allocated_bytes: parse_num("allocated_bytes", fields[3])?,
                    high_watermark_bytes: parse_num("high_watermark_bytes", fields[4])?,
                })
            }
            "TIME" => {
                expect_fields("TIME", &fields, 9)?;
                Ok(Self::Time(TimeRecord {
                    phase: fields[1].to_string(),
                    op: fields[2].to_string(),
                    size: parse_num("size", fields[3])?,
                    tick_in: parse_num("tick_in", fields[4])?,
                    tick_out: parse_num("tick_out", fields[5])?,
                    result: fields[6].to_string(),
                    alloc_count: parse_num("alloc_count", fields[7])?,
                    free_count: parse_num("free_count", fields[8])?,
                }))
            }
            "FAULT" => {
                expect_fields("FAULT", &fields, 4)?;
                if fields[2] != FAULT_SENTINEL {
                    return Err(WireError::BadSentinel(fields[2].to_string()));
                }
                Ok(Self::Fault {
                    tick: parse_num("tick", fields[1])?,
                    reason: fields[3].to_string(),
                })
            }
            "LEAK" => {
                expect_fields("LEAK", &fields, 2)?;
                Ok(Self::Leak {
                    address: parse_address(fields[1])?,
                })
            }
            "NOLEAK" => {
                expect_fields("NOLEAK", &fields, 2)?;
                Ok(Self::NoLeak {
                    address: parse_address(fields[1])?,
                })
            }
            other => Err(WireError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start {
                allocator,
                scenario,
            } => write!(f, "# {allocator} {scenario} start"),
            Self::End {
                allocator,
                scenario,
            } => write!(f, "# {allocator} {scenario} end"),
            Self::Meta { tick_hz } => write!(f, "META,tick_hz,{tick_hz}"),
            Self::Snapshot {
                phase,
                free_bytes,
                allocated_bytes,
                high_watermark_bytes,
            } => write!(
                f,
                "SNAP,{phase},{free_bytes},{allocated_bytes},{high_watermark_bytes}"
            ),
            Self::Time(t) => write!(
                f,
                "TIME,{},{},{},{},{},{},{},{}",
                t.phase,
                t.op,
                t.size,
                t.tick_in,
                t.tick_out,
                t.result,
                t.alloc_count,
                t.free_count
            ),
            Self::Fault { tick, reason } => write!(f, "FAULT,{tick},{FAULT_SENTINEL},{reason}"),
            Self::Leak { address } => write!(f, "LEAK,{address:#x}"),
            Self::NoLeak { address } => write!(f, "NOLEAK,{address:#x}"),
        }
    }
}

fn parse_banner(line: &str) -> Result<EventRecord, WireError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["#", allocator, scenario, "start"] => Ok(EventRecord::Start {
            allocator: (*allocator).to_string(),
            scenario: (*scenario).to_string(),
        }),
        ["#", allocator, scenario, "end"] => Ok(EventRecord::End {
            allocator: (*allocator).to_string(),
            scenario: (*scenario).to_string(),
        }),
        _ => Err(WireError::BadBanner(line.to_string())),
    }
}

fn expect_fields(kind: &'static str, fields: &[&str], expected: usize) -> Result<(), WireError> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(WireError::FieldCount {
            kind,
            expected,
            found: fields.len(),
        })
    }
}

fn parse_num<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, WireError> {
    raw.parse().map_err(|_| WireError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

fn parse_address(raw: &str) -> Result<usize, WireError> {
    let hex = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| WireError::InvalidAddress(raw.to_string()))?;
    usize::from_str_radix(hex, 16).map_err(|_| WireError::InvalidAddress(raw.to_string()))
}
