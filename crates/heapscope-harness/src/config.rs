//! Harness configuration.
//!
//! A JSON document with every field defaulted, so `{}` is a valid config.
//! The path is taken from `--config` or, failing that, the `HEAPSCOPE_CONFIG`
//! environment variable. With neither set the defaults apply.

use std::path::{Path, PathBuf};

use heapscope_core::BackendConfig;
use heapscope_core::clock::DEFAULT_TICK_HZ;
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::wire::LineEnding;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "HEAPSCOPE_CONFIG";

/// Sizes and patterns shared by every scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioParams {
    /// Request size for ordinary allocations.
    pub block_size: usize,
    pub burst_rounds: usize,
    pub burst_count: usize,
    /// Long-lived allocations held through MixedLifetime (each `2 * block_size`).
    pub pin_count: usize,
    /// Bytes written past the end of the overflowed block.
    pub overflow_extra: usize,
    /// Pattern written into a live block before it is freed.
    pub fill_pattern: u8,
    /// Marker written through a stale handle and searched for afterwards.
    pub uaf_marker: u8,
    /// Snapshot every N LeakExhaust allocations (0 disables).
    pub leak_snapshot_every: usize,
    /// Hard stop for LeakExhaust. Defaults to the backend's bound plus one.
    pub max_leak_allocations: Option<usize>,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            block_size: 128,
            burst_rounds: 10,
            burst_count: 10,
            pin_count: 5,
            overflow_extra: 8,
            fill_pattern: 0x5A,
            uaf_marker: 0xA5,
            leak_snapshot_every: 0,
            max_leak_allocations: None,
        }
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Banner name override. `None` uses the backend's short name.
    pub allocator_name: Option<String>,
    pub tick_hz: u32,
    pub line_ending: LineEnding,
    pub scenario: ScenarioParams,
    pub backend: BackendConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            allocator_name: None,
            tick_hz: DEFAULT_TICK_HZ,
            line_ending: LineEnding::default(),
            scenario: ScenarioParams::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Parse from a JSON string and validate.
    pub fn from_json(json: &str) -> Result<Self, HarnessError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from a file path.
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let wrap = |source: HarnessError| HarnessError::ConfigFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        };
        let content = std::fs::read_to_string(path).map_err(|e| wrap(e.into()))?;
        Self::from_json(&content).map_err(wrap)
    }

    /// Resolve the config: explicit path, then `HEAPSCOPE_CONFIG`, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, HarnessError> {
        match resolve_path(explicit, std::env::var(CONFIG_ENV).ok()) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Reject configurations no scenario can run with.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let s = &self.scenario;
        let b = &self.backend;
        let checks: [(bool, &str); 11] = [
            (s.block_size == 0, "scenario.block_size must be > 0"),
            (s.burst_rounds == 0, "scenario.burst_rounds must be > 0"),
            (s.burst_count == 0, "scenario.burst_count must be > 0"),
            (s.overflow_extra == 0, "scenario.overflow_extra must be > 0"),
            (
                s.fill_pattern == s.uaf_marker,
                "scenario.uaf_marker must differ from scenario.fill_pattern",
            ),
            (self.tick_hz == 0, "tick_hz must be > 0"),
            (b.heap_bytes == 0, "backend.heap_bytes must be > 0"),
            (
                b.pool_block_size == 0 || b.pool_block_count == 0,
                "backend.pool_block_size and backend.pool_block_count must be > 0",
            ),
            (b.segfit_bytes == 0, "backend.segfit_bytes must be > 0"),
            (b.arena_bytes == 0, "backend.arena_bytes must be > 0"),
            (
                s.max_leak_allocations == Some(0),
                "scenario.max_leak_allocations must be > 0 when set",
            ),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(HarnessError::InvalidConfig((*message).to_string()));
        }

        if let Some(name) = &self.allocator_name
            && (name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == ','))
        {
            return Err(HarnessError::InvalidConfig(format!(
                "allocator_name '{name}' must be a single token without commas"
            )));
        }
        Ok(())
    }
}

fn resolve_path(explicit: Option<&Path>, env_value: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    env_value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = HarnessConfig::from_json("{}").unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.scenario.block_size, 128);
        assert_eq!(config.scenario.pin_count, 5);
        assert_eq!(config.backend.base_address, 0x2000_0000);
        assert_eq!(config.line_ending, LineEnding::Lf);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = HarnessConfig::from_json(
            r#"{"line_ending":"crlf","scenario":{"burst_rounds":2},"backend":{"pool_block_count":8}}"#,
        )
        .unwrap();
        assert_eq!(config.line_ending, LineEnding::CrLf);
        assert_eq!(config.scenario.burst_rounds, 2);
        assert_eq!(config.scenario.burst_count, 10);
        assert_eq!(config.backend.pool_block_count, 8);
        assert_eq!(config.backend.pool_block_size, 128);
    }

    #[test]
    fn zero_rounds_rejected() {
        let err = HarnessConfig::from_json(r#"{"scenario":{"burst_rounds":0}}"#).unwrap_err();
        assert!(err.to_string().contains("burst_rounds"), "{err}");
    }

    #[test]
    fn zero_overflow_rejected() {
        let err = HarnessConfig::from_json(r#"{"scenario":{"overflow_extra":0}}"#).unwrap_err();
        assert!(err.to_string().contains("overflow_extra"), "{err}");
    }

    #[test]
    fn marker_equal_to_fill_rejected() {
        let err = HarnessConfig::from_json(r#"{"scenario":{"uaf_marker":90}}"#).unwrap_err();
        assert!(err.to_string().contains("uaf_marker"), "{err}");
    }

    #[test]
    fn allocator_name_must_be_one_token() {
        let err = HarnessConfig::from_json(r#"{"allocator_name":"my heap"}"#).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
        assert!(HarnessConfig::from_json(r#"{"allocator_name":"newlib-nano"}"#).is_ok());
    }

    #[test]
    fn explicit_path_wins_over_env() {
        let explicit = Path::new("/tmp/a.json");
        assert_eq!(
            resolve_path(Some(explicit), Some("/tmp/b.json".into())),
            Some(PathBuf::from("/tmp/a.json"))
        );
        assert_eq!(
            resolve_path(None, Some(" /tmp/b.json ".into())),
            Some(PathBuf::from("/tmp/b.json"))
        );
        assert_eq!(resolve_path(None, Some("  ".into())), None);
        assert_eq!(resolve_path(None, None), None);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = HarnessConfig::from_file(Path::new("/nonexistent/heapscope.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/heapscope.json"), "{err}");
    }

    #[test]
    fn json_round_trip_preserves_values() {
        let config = HarnessConfig {
            allocator_name: Some("zephyr".into()),
            scenario: ScenarioParams {
                max_leak_allocations: Some(32),
                ..ScenarioParams::default()
            },
            ..HarnessConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(HarnessConfig::from_json(&json).unwrap(), config);
    }
}
