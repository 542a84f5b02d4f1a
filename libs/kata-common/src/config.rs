// Engine limits for sandboxed evaluation
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/kata.json";

/// Resource limits applied to every evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget for one script evaluation (all vectors)
    pub timeout_ms: u64,
    /// Heap the script engine may allocate before learner code is stopped
    pub max_memory_bytes: usize,
    /// Native stack the script engine may use (bounds recursion depth)
    pub max_stack_bytes: usize,
    /// Submissions larger than this are rejected before materialization
    pub max_source_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            max_memory_bytes: 64 * 1024 * 1024,
            max_stack_bytes: 1024 * 1024,
            max_source_bytes: 64 * 1024,
        }
    }
}

impl EngineConfig {
    /// Load limits from a JSON file; fails if the file is missing or malformed
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Engine config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config.with_env_overrides())
    }

    /// Load from `config_path`, falling back to defaults when it does not exist
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }
        debug!(path = %config_path.display(), "Engine config not found, using defaults");
        Ok(Self::default().with_env_overrides())
    }

    /// Apply `KATA_TIMEOUT_MS` / `KATA_MAX_MEMORY_BYTES` when they parse
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var("KATA_TIMEOUT_MS") {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => self.timeout_ms = ms,
                _ => warn!(value = %raw, "Ignoring invalid KATA_TIMEOUT_MS"),
            }
        }
        if let Ok(raw) = std::env::var("KATA_MAX_MEMORY_BYTES") {
            match raw.parse::<usize>() {
                Ok(limit) if limit > 0 => self.max_memory_bytes = limit,
                _ => warn!(value = %raw, "Ignoring invalid KATA_MAX_MEMORY_BYTES"),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        if self.max_memory_bytes == 0 {
            bail!("max_memory_bytes must be greater than zero");
        }
        if self.max_stack_bytes == 0 {
            bail!("max_stack_bytes must be greater than zero");
        }
        if self.max_source_bytes == 0 {
            bail!("max_source_bytes must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("kata-{}-{}", uuid::Uuid::new_v4(), name))
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = temp_path("kata.json");
        fs::write(&path, r#"{ "timeout_ms": 500 }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.max_memory_bytes, EngineConfig::default().max_memory_bytes);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = temp_path("absent.json");
        assert!(EngineConfig::load(&path).is_err());
        assert!(EngineConfig::load_or_default(&path).is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let path = temp_path("zero.json");
        fs::write(&path, r#"{ "max_memory_bytes": 0 }"#).unwrap();

        let err = EngineConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("max_memory_bytes"));

        fs::remove_file(&path).ok();
    }
}
