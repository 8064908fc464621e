//! Configuration for repositories and the in-memory store

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Default prefix for environment variables
pub const DEFAULT_ENV_PREFIX: &str = "STRATA";

/// Event sourcing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSourcingConfig {
    /// Log repository calls at info level
    pub enable_logging: bool,

    /// Reject ids the id generator could not have produced
    pub validate_ids: bool,

    /// Drop events covered by a stored snapshot (in-memory store)
    pub compact_on_snapshot: bool,
}

impl Default for EventSourcingConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            validate_ids: true,
            compact_on_snapshot: false,
        }
    }
}

impl EventSourcingConfig {
    /// Load from `{prefix}_ENABLE_LOGGING`, `{prefix}_VALIDATE_IDS` and
    /// `{prefix}_COMPACT_ON_SNAPSHOT`, after reading a `.env` file if one
    /// exists. Unset variables keep their defaults.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Some(value) = read_bool(prefix, "ENABLE_LOGGING")? {
            config.enable_logging = value;
        }
        if let Some(value) = read_bool(prefix, "VALIDATE_IDS")? {
            config.validate_ids = value;
        }
        if let Some(value) = read_bool(prefix, "COMPACT_ON_SNAPSHOT")? {
            config.compact_on_snapshot = value;
        }
        Ok(config)
    }

    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(format!("TOML: {}", e)))
    }

    /// Parse from JSON
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(format!("JSON: {}", e)))
    }

    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let content = fs::read_to_string(path)?;
        match ext.to_lowercase().as_str() {
            "toml" => Self::from_toml_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(ConfigError::LoadError(format!("Unsupported format: {}", other))),
        }
    }
}

fn read_bool(prefix: &str, key: &str) -> Result<Option<bool>, ConfigError> {
    let name = format!("{}_{}", prefix, key);
    match env::var(&name) {
        Ok(raw) => parse_bool(&raw)
            .map(Some)
            .ok_or_else(|| ConfigError::ParseError(format!("{} is not a boolean: {}", name, raw))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvError(e)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvError(#[from] env::VarError),
}
