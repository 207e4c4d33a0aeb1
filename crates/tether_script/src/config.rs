//! Engine configuration

use crate::error::ScriptError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings applied when an engine instance is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the script global carrying `toJsArray`, `arguments` and host functions.
    pub host_global: String,
    /// Reported to script as `arguments[0]`.
    pub process_name: String,
    pub limits: EngineLimits,
}

/// QuickJS runtime limits. `None` keeps the engine default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    pub memory_limit: Option<usize>,
    pub max_stack_size: Option<usize>,
    pub gc_threshold: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_global: "Host".to_string(),
            process_name: "tether".to_string(),
            limits: EngineLimits::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let json = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ScriptError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "process_name": "demo" }"#).unwrap();
        assert_eq!(config.process_name, "demo");
        assert_eq!(config.host_global, "Host");
        assert_eq!(config.limits, EngineConfig::default().limits);
    }

    #[test]
    fn nested_limits_parse() {
        let config =
            EngineConfig::from_json_str(r#"{ "limits": { "memory_limit": 8388608 } }"#).unwrap();
        assert_eq!(config.limits.memory_limit, Some(8 * 1024 * 1024));
        assert_eq!(config.limits.max_stack_size, None);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(ScriptError::Config(_))
        ));
    }

    #[test]
    fn survives_serialization() {
        let config = EngineConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
    }
}
