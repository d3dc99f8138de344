//! Configuration structures.
//!
//! Configuration is loaded from JSON files with environment overrides; every
//! section falls back to defaults when omitted.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::errors::{Error, Result};

/// Global engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Apply `BPMN_ENGINE_NAME`, `BPMN_ENGINE_MAX_STEPS` and `BPMN_LOG_LEVEL`.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(name) = std::env::var("BPMN_ENGINE_NAME") {
            self.engine.name = name;
        }
        if let Ok(raw) = std::env::var("BPMN_ENGINE_MAX_STEPS") {
            self.engine.max_steps_per_run = raw.parse().map_err(|_| {
                Error::validation(format!("BPMN_ENGINE_MAX_STEPS is not a number: {}", raw))
            })?;
        }
        if let Ok(level) = std::env::var("BPMN_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.engine.name.is_empty() {
            return Err(Error::validation("engine.name cannot be empty"));
        }
        if self.engine.max_steps_per_run == 0 {
            return Err(Error::validation("engine.max_steps_per_run must be positive"));
        }
        if self.engine.node_id > crate::engine::keys::MAX_NODE_ID {
            return Err(Error::validation(format!(
                "engine.node_id must be <= {}",
                crate::engine::keys::MAX_NODE_ID
            )));
        }
        Ok(())
    }
}

/// Which key generator the engine allocates keys from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyGeneratorKind {
    /// Atomic counter starting at `key_seed`.
    #[default]
    Sequential,
    /// Timestamp/node/sequence keys.
    Snowflake,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine name (used in logs).
    pub name: String,

    /// Key generator implementation.
    pub key_generator: KeyGeneratorKind,

    /// First key handed out by the sequential generator.
    pub key_seed: i64,

    /// Node id embedded in snowflake keys (0..=1023).
    pub node_id: u16,

    /// Maximum number of elements a single run may walk.
    pub max_steps_per_run: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "bpmn-engine".to_string(),
            key_generator: KeyGeneratorKind::Sequential,
            key_seed: 1,
            node_id: 0,
            max_steps_per_run: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.name, "bpmn-engine");
        assert_eq!(config.engine.key_generator, KeyGeneratorKind::Sequential);
        assert_eq!(config.engine.max_steps_per_run, 10_000);
        assert_eq!(config.observability.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = Config::from_json_str(
            r#"{"engine": {"name": "orders", "key_generator": "snowflake", "node_id": 7}}"#,
        )
        .unwrap();
        assert_eq!(config.engine.name, "orders");
        assert_eq!(config.engine.key_generator, KeyGeneratorKind::Snowflake);
        assert_eq!(config.engine.node_id, 7);
        assert_eq!(config.engine.max_steps_per_run, 10_000);
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_json_str(r#"{"engine": {"name": ""}}"#).is_err());
        assert!(Config::from_json_str(r#"{"engine": {"max_steps_per_run": 0}}"#).is_err());
        assert!(Config::from_json_str(r#"{"engine": {"node_id": 4096}}"#).is_err());
        assert!(matches!(
            Config::from_json_str("{not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"observability": {{"json_logs": true}}}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.observability.json_logs);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Config::from_file("/definitely/not/here.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
