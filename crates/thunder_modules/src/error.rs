//! Error types for module resolution and execution.

use std::path::PathBuf;

use thiserror::Error;
use thunder_config::ConfigError;
use thunder_core::{CoreError, ExportError};

/// Result type alias for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Result type alias for cross-stack lookups.
pub type StackResult<T> = Result<T, StackError>;

/// Errors that can occur while discovering, resolving or running modules.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("module population failed: no `{package}` directory above {start}")]
    PackageRootNotFound { package: String, start: PathBuf },

    #[error("module `{module}` was not found under provider `{provider}`")]
    ModuleNotFound { provider: String, module: String },

    #[error("provider `{0}` has no modules")]
    ProviderNotFound(String),

    #[error("no module definition registered for `{path}`")]
    NoModuleDefinition { path: String },

    #[error("more than one module definition registered for `{path}`: {candidates}")]
    AmbiguousModule { path: String, candidates: String },

    #[error("module `{path}` does not declare a configuration type")]
    MissingConfigType { path: String },

    #[error("module `{type_name}` is already registered for `{path}`")]
    DuplicateModule { path: String, type_name: String },

    #[error("module `{name}` under provider `{provider}` is claimed by both `{first}` and `{second}`")]
    NameCollision {
        provider: String,
        name: String,
        first: String,
        second: String,
    },

    #[error("invalid module name `{0}`: only letters, digits and underscores are allowed")]
    InvalidModuleName(String),

    #[error("module `{module}` failed: {message}")]
    Build { module: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Core(#[from] CoreError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Stack lookup error: {0}")]
    Stack(#[from] StackError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModuleError {
    pub fn build(module: impl Into<String>, message: impl Into<String>) -> Self {
        ModuleError::Build {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur while querying another stack's outputs.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("invalid query `{expression}`: {message}")]
    InvalidQuery { expression: String, message: String },

    #[error("Engine error: {0}")]
    Core(#[from] CoreError),
}
