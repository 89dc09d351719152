//! Configuration management
//!
//! One TOML file, one struct per concern. Every field has a default so a
//! partial file (or none at all) is valid.

pub mod sections;

pub use sections::{
    AgentSection, AutonomyConfig, GuardConfig, LoggingConfig, MemoryConfig, ToolPolicy,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimusConfig {
    pub agent: AgentSection,
    pub guard: GuardConfig,
    pub autonomy: AutonomyConfig,
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
}

impl AnimusConfig {
    /// Load from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<config_dir>/animus/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("animus").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults, then apply
    /// `ANIMUS_*` environment overrides.
    pub fn load() -> Self {
        let mut config = Self::default_path()
            .filter(|path| path.exists())
            .and_then(|path| match Self::from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unreadable config, using defaults");
                    None
                }
            })
            .unwrap_or_default();
        config.apply_env();
        config
    }

    /// Environment overrides (`ANIMUS_AGENT_NAME`, `ANIMUS_MAX_RETRIES`,
    /// `ANIMUS_MIN_SILENCE_MS`, `ANIMUS_LOG_FILE`)
    pub fn apply_env(&mut self) {
        use std::env;

        if let Ok(name) = env::var("ANIMUS_AGENT_NAME") {
            if !name.trim().is_empty() {
                self.agent.name = name;
            }
        }
        if let Ok(val) = env::var("ANIMUS_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.guard.max_retries = retries;
            }
        }
        if let Ok(val) = env::var("ANIMUS_MIN_SILENCE_MS") {
            if let Ok(ms) = val.parse() {
                self.autonomy.min_silence_ms = ms;
            }
        }
        if let Ok(path) = env::var("ANIMUS_LOG_FILE") {
            self.logging.log_file = Some(PathBuf::from(path));
        }
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(&mut self, other: AnimusConfig) {
        self.agent.merge(other.agent);
        self.guard.merge(other.guard);
        self.autonomy = other.autonomy;
        self.memory = other.memory;
        self.logging.merge(other.logging);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.agent.name.trim().is_empty() {
            return invalid("agent.name must not be empty".into());
        }
        if !(self.guard.temperature_decrement >= 0.0) {
            return invalid("guard.temperature_decrement must be >= 0".into());
        }
        if !(self.guard.fact_tolerance >= 0.0) {
            return invalid("guard.fact_tolerance must be >= 0".into());
        }
        if self.autonomy.base_interval_ms == 0 {
            return invalid("autonomy.base_interval_ms must be > 0".into());
        }
        if self.autonomy.base_interval_ms > self.autonomy.max_interval_ms {
            return invalid(format!(
                "autonomy.base_interval_ms ({}) exceeds max_interval_ms ({})",
                self.autonomy.base_interval_ms, self.autonomy.max_interval_ms
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for tool in &self.guard.tools {
            if tool.name.trim().is_empty() {
                return invalid("guard.tools entries need a name".into());
            }
            if !seen.insert(tool.name.to_ascii_uppercase()) {
                return invalid(format!("duplicate tool policy: {}", tool.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[guard]\nmax_retries = 4\n").unwrap();

        let config = AnimusConfig::from_file(&path).unwrap();
        assert_eq!(config.guard.max_retries, 4);
        assert_eq!(config.guard.tool_quota_per_turn, 1);
        assert_eq!(config.autonomy, AutonomyConfig::default());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AnimusConfig::default();
        config.agent.name = "Nyx".into();
        config.to_file(&path).unwrap();

        assert_eq!(AnimusConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_duplicate_tools() {
        let mut config = AnimusConfig::default();
        config.guard.tools.push(ToolPolicy::new("search", 1.0, 0));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validate_rejects_inverted_intervals() {
        let mut config = AnimusConfig::default();
        config.autonomy.base_interval_ms = config.autonomy.max_interval_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[autonomy]\nbase_interval_ms = 0\n").unwrap();

        let err = AnimusConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("base_interval_ms must be > 0"));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "guard = 3").unwrap();
        let err = AnimusConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
