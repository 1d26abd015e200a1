//! Error types for configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or mapping configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot locate the program entrypoint: {0}")]
    EntrypointNotFound(String),

    #[error("Missing required configuration variable '{key}'")]
    MissingKey { key: String },

    #[error("Invalid configuration document {path}: {message}")]
    InvalidDocument { path: PathBuf, message: String },

    #[error("Template rendering failed in {path}: {message}")]
    Template { path: PathBuf, message: String },

    #[error("Unknown configuration field `{path}`")]
    UnknownField { path: String },

    #[error("Missing required configuration field `{path}`")]
    MissingField { path: String },

    #[error("Invalid value {value} for enum field `{path}`, expected one of: {expected}")]
    InvalidEnum {
        path: String,
        value: String,
        expected: String,
    },

    #[error("Invalid type for configuration field `{path}`: expected {expected}, found {found}")]
    InvalidType {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Configuration for stack `{stack}` does not match its type: {message}")]
    Deserialize { stack: String, message: String },

    #[error("Unknown provider: neither `aws:region` nor `azure-native:location` is set")]
    UnknownProvider,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Whether the error names a required key or field that is absent.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            ConfigError::MissingKey { .. } | ConfigError::MissingField { .. }
        )
    }
}
