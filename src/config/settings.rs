//! Application settings stored in `config.toml`.
//!
//! Every field has a default, so a partial (or missing) file is valid.

use crate::config::{app_data_dir, DEFAULT_STORE_FILE};
use crate::error::{NodeflowError, Result};
use crate::scripting::EvaluatorLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default tracing filter for the binary
pub const DEFAULT_LOG_FILTER: &str = "info,nodeflow_rs=debug";

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Version for future migration support
    pub version: u32,

    pub store: StoreConfig,

    pub logging: LoggingConfig,

    /// Limits applied to node scripts
    pub evaluator: EvaluatorLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            evaluator: EvaluatorLimits::default(),
        }
    }
}

impl AppConfig {
    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = crate::config::config_path().ok_or_else(|| {
            NodeflowError::Config("Could not determine config path".to_string())
        })?;
        Self::load_from(&path)
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            NodeflowError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            NodeflowError::Config(format!("Failed to parse config {:?}: {}", path, e))
        })
    }

    /// Load config, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to the default location
    pub fn save(&self) -> Result<()> {
        let dir = crate::config::ensure_app_data_dir()?;
        self.save_to(dir.join(crate::config::CONFIG_FILE))
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                NodeflowError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| NodeflowError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            NodeflowError::Config(format!("Failed to write config {:?}: {}", path, e))
        })
    }

    /// Definition store location: the configured path, else the data dir.
    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store.path {
            return Ok(path.clone());
        }
        app_data_dir()
            .map(|dir| dir.join(DEFAULT_STORE_FILE))
            .ok_or_else(|| {
                NodeflowError::Config("Could not determine app data directory".to_string())
            })
    }
}

/// Definition store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file; defaults to `definitions.db` in the data dir
    pub path: Option<PathBuf>,
}

/// Logging settings for the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    pub filter: String,

    /// When set, logs are also written to a daily rolling file here
    pub directory: Option<PathBuf>,

    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
            file_prefix: "nodeflow.log".to_string(),
        }
    }
}
