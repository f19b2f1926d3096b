//! Error handling for nodeflow-rs
//!
//! Each layer owns a focused error enum (`ParseError`, `ExecutionError`,
//! `PipelineError`, `StoreError`). This module defines the crate-wide
//! [`NodeflowError`] that wraps them, plus a Result alias for use
//! throughout the library.

use crate::pipeline::PipelineError;
use crate::registry::StoreError;
use crate::scripting::{ExecutionError, ParseError};
use thiserror::Error;

/// Main error type for nodeflow-rs operations
#[derive(Error, Debug)]
pub enum NodeflowError {
    /// Node source text could not be turned into a definition
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A node's code failed while running
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Graph editing or scheduling errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Definition store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A definition name that the registry does not know
    #[error("Unknown node definition: {0}")]
    UnknownDefinition(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<NodeflowError>,
    },
}

impl NodeflowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        NodeflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for NodeflowError {
    fn from(err: serde_json::Error) -> Self {
        NodeflowError::Serialization(err.to_string())
    }
}

/// Result type alias for nodeflow-rs operations
pub type Result<T> = std::result::Result<T, NodeflowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<NodeflowError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NodeflowError::UnknownDefinition("blur".to_string());
        assert_eq!(err.to_string(), "Unknown node definition: blur");
    }

    #[test]
    fn test_error_with_context() {
        let err = NodeflowError::Config("bad value".to_string());
        let with_ctx = err.with_context("Failed to load config");
        assert!(with_ctx.to_string().contains("Failed to load config"));
        assert!(with_ctx.to_string().contains("bad value"));
    }

    #[test]
    fn test_parse_error_converts() {
        let result: std::result::Result<(), ParseError> = Err(ParseError::NoFunction);
        let err = result.context("Loading definition").unwrap_err();
        assert!(err.to_string().starts_with("Loading definition"));
    }
}
