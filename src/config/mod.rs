//! Configuration module for nodeflow-rs
//!
//! This module handles:
//! - Application settings (`config.toml`): store location, logging and
//!   script limits
//! - Graph files (`.json`) holding a serialized node graph
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.nodeflow.nodeflow-rs/`
//! - **macOS**: `~/Library/Application Support/dev.nodeflow.nodeflow-rs/`
//! - **Windows**: `%APPDATA%\dev.nodeflow.nodeflow-rs\`
//!
//! # Files
//!
//! - `config.toml` - [`AppConfig`]
//! - `definitions.db` - SQLite definition store (unless configured elsewhere)
//!
//! # Example
//!
//! ```ignore
//! use nodeflow_rs::config::{AppConfig, GraphFile};
//!
//! let config = AppConfig::load_or_default();
//! let file = GraphFile::load("pipeline.json")?;
//! let graph = file.into_graph(&registry)?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{NodeflowError, Result};
use crate::pipeline::{Graph, GraphDocument};
use crate::registry::NodeRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.nodeflow.nodeflow-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default definition store filename
pub const DEFAULT_STORE_FILE: &str = "definitions.db";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        NodeflowError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            NodeflowError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the config file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Graph File ====================

/// A graph document on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFile {
    /// Version for future migration support
    #[serde(default = "default_graph_file_version")]
    pub version: u32,

    #[serde(flatten)]
    pub document: GraphDocument,
}

fn default_graph_file_version() -> u32 {
    1
}

impl GraphFile {
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            version: default_graph_file_version(),
            document: graph.to_document(),
        }
    }

    /// Rebuild the graph, taking definitions for code-less nodes from
    /// `registry`.
    pub fn into_graph(self, registry: &NodeRegistry) -> Result<Graph> {
        Ok(Graph::from_document(&self.document, registry)?)
    }

    /// Load a graph file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NodeflowError::Config(format!("Failed to read graph file {:?}: {}", path, e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            NodeflowError::Config(format!("Failed to parse graph file {:?}: {}", path, e))
        })
    }

    /// Save graph file to disk as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                NodeflowError::Config(format!("Failed to create graph directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;

        std::fs::write(path, content).map_err(|e| {
            NodeflowError::Config(format!("Failed to write graph file {:?}: {}", path, e))
        })
    }
}
