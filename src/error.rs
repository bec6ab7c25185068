//! Error handling for voxgraph
//!
//! `GraphError` covers the dataflow runtime itself; `WorkbenchError` wraps it
//! together with configuration, IO and serialization failures for callers
//! that assemble a whole workbench.

use crate::graph::GraphError;
use thiserror::Error;

/// Main error type for workbench-level operations
#[derive(Error, Debug)]
pub enum WorkbenchError {
    /// Errors raised by the module graph
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to volume presets
    #[error("Preset error: {0}")]
    Preset(String),

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
        source: Box<WorkbenchError>,
    },
}

impl WorkbenchError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        WorkbenchError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for workbench operations
pub type Result<T> = std::result::Result<T, WorkbenchError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, GraphError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| WorkbenchError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| WorkbenchError::from(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PortKind;

    #[test]
    fn test_error_display() {
        let err = WorkbenchError::Config("missing section".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing section");
    }

    #[test]
    fn test_error_with_context() {
        let err = WorkbenchError::Preset("test".to_string());
        let with_ctx = err.with_context("Failed to select");
        assert!(with_ctx.to_string().starts_with("Failed to select"));
    }

    #[test]
    fn test_graph_result_context() {
        let result: std::result::Result<(), GraphError> = Err(GraphError::KindMismatch {
            output: PortKind::Base,
            input: PortKind::Scene,
        });
        let err = result.context("Connecting base to scene").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Connecting base to scene"));
        assert!(text.contains("Kind mismatch"));
    }
}
