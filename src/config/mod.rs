//! Adapter configuration
//!
//! Loaded from a JSON5 file. Every field has a default, and a missing file
//! yields the defaults. Limits may tighten the platform maxima but never
//! raise them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::credentials::Limits;
use crate::logging::LoggingConfig;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "CREDVAULT_CONFIG_PATH";

const CONFIG_FILE_NAME: &str = "config.json5";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Bounds applied before every write
    pub limits: Limits,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.check().map_err(ConfigError::Invalid)
    }
}

/// `$CREDVAULT_CONFIG_PATH`, else `<config dir>/credvault/config.json5`.
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("credvault")
        .join(CONFIG_FILE_NAME)
}

/// Parse and validate configuration text.
pub fn parse_config(raw: &str, origin: &str) -> Result<Config, ConfigError> {
    let config: Config = json5::from_str(raw).map_err(|e| ConfigError::Parse {
        path: origin.to_string(),
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`; a missing file gives the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    let config = parse_config(&raw, &path.display().to_string())?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Load configuration from the default location.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&get_config_path())
}
