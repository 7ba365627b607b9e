//! Client configuration for the AMI command client.
//!
//! Values are resolved from built-in defaults, then an optional JSON file
//! (`~/.config/ami/config.json` on most platforms, or `$AMI_CONFIG_PATH`),
//! then environment variables. A missing file is not an error.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ami_types::{DEFAULT_CONVERTER, DEFAULT_TIMEOUT_MS, RowsetBindings};
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "AMI_CONFIG_PATH";
pub const ENDPOINT_ENV: &str = "AMI_ENDPOINT";
pub const CONVERTER_ENV: &str = "AMI_CONVERTER";
pub const TIMEOUT_ENV: &str = "AMI_TIMEOUT_MS";

/// Default filename for the JSON payload.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Error surfaced when configuration cannot be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{name} must be a number of milliseconds, got '{value}'")]
    InvalidTimeout { name: &'static str, value: String },
}

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmiConfig {
    /// Base URL of the AMI front end command servlet.
    pub endpoint: Option<String>,
    pub converter: String,
    pub timeout_ms: u64,
    pub rowset_bindings: RowsetBindings,
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            converter: DEFAULT_CONVERTER.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            rowset_bindings: RowsetBindings::default(),
        }
    }
}

impl AmiConfig {
    /// Load from the default file location plus environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(default_config_path().as_deref())
    }

    /// Load from `path` (when it exists) plus environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => read_config_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(endpoint) = non_empty_env(ENDPOINT_ENV) {
            self.endpoint = Some(endpoint);
        }
        // An empty converter is meaningful (raw text), so only absence falls through.
        if let Ok(converter) = env::var(CONVERTER_ENV) {
            self.converter = converter;
        }
        if let Some(raw_timeout) = non_empty_env(TIMEOUT_ENV) {
            self.timeout_ms = raw_timeout.trim().parse().map_err(|_| ConfigError::InvalidTimeout {
                name: TIMEOUT_ENV,
                value: raw_timeout.clone(),
            })?;
        }
        Ok(())
    }
}

/// `$AMI_CONFIG_PATH`, or `<config dir>/ami/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    config_dir().map(|dir| dir.join("ami").join(CONFIG_FILE_NAME))
}

fn read_config_file(path: &Path) -> Result<AmiConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no AMI config file; using defaults");
            Ok(AmiConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
