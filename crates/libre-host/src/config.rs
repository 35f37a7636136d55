//! Host configuration.
//!
//! Values come from an optional JSON file, then from `LIBRE_OOP_*`
//! environment variables (a `.env` file in the working directory is loaded
//! first), so the oracle token never has to live in the config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use libre_core::OracleConfig;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

pub const ENV_ENDPOINT: &str = "LIBRE_OOP_ENDPOINT";
pub const ENV_TOKEN: &str = "LIBRE_OOP_TOKEN";
pub const ENV_CACHE_PATH: &str = "LIBRE_OOP_CACHE_PATH";
pub const ENV_TIMEOUT_SECS: &str = "LIBRE_OOP_TIMEOUT_SECS";

const DEFAULT_CACHE_PATH: &str = "libre-oop-calibration.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {details}")]
    Read { path: String, details: String },
    #[error("Invalid config file: {0}")]
    Parse(String),
    #[error("Missing setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Failed to set up HTTP client: {0}")]
    Transport(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub oracle: OracleConfig,
    /// Location of the single cached calibration record
    pub cache_path: PathBuf,
    pub request_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HostConfig {
    /// Load the config file (if any), apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    details: e.to_string(),
                })?;
                Self::from_json(&text)?
            }
            None => Self::default(),
        };

        if let Ok(env_file) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", env_file.display());
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Override settings from a variable lookup (the process environment in practice)
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.oracle.endpoint = endpoint;
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.oracle.token = token;
        }
        if let Some(path) = lookup(ENV_CACHE_PATH) {
            self.cache_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs =
                secs.parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_TIMEOUT_SECS,
                    value: secs.clone(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oracle.endpoint.is_empty() {
            return Err(ConfigError::Missing("oracle endpoint"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
