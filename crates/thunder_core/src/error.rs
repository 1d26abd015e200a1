//! Error types for the core module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type alias for export flattening.
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur while talking to the engine or the config store.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Deferred value already resolved")]
    AlreadyResolved,

    #[error("Derived deferred values cannot be resolved directly")]
    NotASlot,

    #[error("Resource already completed: {0}")]
    ResourceCompleted(String),

    #[error("Invalid stack file {path}: {message}")]
    InvalidStackFile { path: PathBuf, message: String },

    #[error("Invalid stack state for `{stack}`: {message}")]
    InvalidStackState { stack: String, message: String },

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while turning a module's exports into an export tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("Unexpected value of type `{type_name}` in module exports")]
    Unsupported { type_name: String },

    #[error("Deferred value has not resolved yet")]
    Unresolved,

    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for ExportError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        ExportError::Custom(msg.to_string())
    }
}
