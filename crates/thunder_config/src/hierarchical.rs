//! Hierarchical configuration files.
//!
//! `Thunder.common.yaml` files are looked up next to the program entrypoint
//! and in its parent directories. Each file is rendered as a template and the
//! layers are merged farthest first, so a file closer to the entrypoint
//! overrides one higher up the tree:
//!
//! ```text
//! repo/                      <- .git here stops the walk
//! ├── Thunder.common.yaml    team: infra
//! └── sysenvs/aws/sandbox/
//!     ├── Thunder.common.yaml    team: platform     (wins)
//!     └── Pulumi.yaml
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{merge_layers, merge_mappings};
use crate::template::ConfigRenderer;

/// Default configuration file name.
pub const DEFAULT_FILENAME: &str = "Thunder.common.yaml";

/// Default number of parent directories to search.
pub const DEFAULT_LIMIT: usize = 5;

/// Environment variable naming the program entrypoint.
pub const ENTRYPOINT_ENV: &str = "THUNDER_ENTRYPOINT";

/// Where and how to look for configuration files.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Max parent directories to walk.
    pub limit: usize,
    /// File name to find and merge.
    pub filename: String,
    /// Program entrypoint, a file or a directory.
    pub entrypoint: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            filename: DEFAULT_FILENAME.to_string(),
            entrypoint: None,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<PathBuf>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Directory of the program entrypoint.
    fn entrypoint_dir(&self) -> ConfigResult<PathBuf> {
        let entrypoint = match &self.entrypoint {
            Some(path) => path.clone(),
            None => env::var_os(ENTRYPOINT_ENV).map(PathBuf::from).ok_or_else(|| {
                ConfigError::EntrypointNotFound(format!(
                    "no entrypoint given and {} is not set",
                    ENTRYPOINT_ENV
                ))
            })?,
        };

        let entrypoint = if entrypoint.is_absolute() {
            entrypoint
        } else {
            env::current_dir()?.join(entrypoint)
        };

        if entrypoint.is_dir() {
            Ok(entrypoint)
        } else if entrypoint.is_file() {
            entrypoint.parent().map(Path::to_path_buf).ok_or_else(|| {
                ConfigError::EntrypointNotFound(format!("{:?} has no parent directory", entrypoint))
            })
        } else {
            Err(ConfigError::EntrypointNotFound(format!(
                "{:?} does not exist",
                entrypoint
            )))
        }
    }
}

/// Configuration merged from every discovered file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchicalConfig {
    data: Mapping,
    sources: Vec<PathBuf>,
}

static GLOBAL: OnceCell<HierarchicalConfig> = OnceCell::new();

impl HierarchicalConfig {
    /// Discover, render and merge configuration files.
    pub fn load(options: &LoadOptions) -> ConfigResult<Self> {
        let entrypoint = options.entrypoint_dir()?;
        debug!("Entrypoint: {:?}", entrypoint);

        let mut sources = discover_configs(&entrypoint, options.limit, &options.filename);
        sources.reverse();
        debug!("Found configs in {:?}", sources);

        let layers = sources
            .iter()
            .map(|path| read_layer(path))
            .collect::<ConfigResult<Vec<_>>>()?;

        let data = render_and_merge(&sources, layers, &ConfigRenderer::new())?;
        Ok(Self { data, sources })
    }

    /// Process-wide configuration, loaded with default options on first use.
    pub fn global() -> ConfigResult<&'static HierarchicalConfig> {
        GLOBAL.get_or_try_init(|| Self::load(&LoadOptions::default()))
    }

    /// Build a configuration from an already merged mapping.
    pub fn from_mapping(data: Mapping) -> Self {
        Self {
            data,
            sources: Vec::new(),
        }
    }

    /// Files that contributed, farthest first.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn data(&self) -> &Mapping {
        &self.data
    }

    /// Look up `key`. A key that is not present verbatim is walked as a
    /// dotted path through nested maps (`network.cidr`).
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(key) {
            return Some(value);
        }
        let mut parts = key.split('.');
        let mut current = self.data.get(parts.next()?)?;
        for part in parts {
            current = current.as_mapping()?.get(part)?;
        }
        Some(current)
    }

    /// `get` with a default. Never fails.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or(default)
    }

    pub fn get_str_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(value_to_string)
            .unwrap_or_else(|| default.to_string())
    }

    /// Return `key` or fail with an error naming it. Null counts as absent.
    pub fn require(&self, key: &str) -> ConfigResult<&Value> {
        self.get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| ConfigError::MissingKey {
                key: key.to_string(),
            })
    }

    /// `require` for scalar values, rendered as a string.
    pub fn require_str(&self, key: &str) -> ConfigResult<String> {
        self.require(key).and_then(|value| {
            value_to_string(value).ok_or_else(|| ConfigError::InvalidType {
                path: key.to_string(),
                expected: "scalar".to_string(),
                found: "collection".to_string(),
            })
        })
    }

    /// Deserialize the value at `key`, if present.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<Option<T>> {
        match self.get(key) {
            Some(value) if !value.is_null() => Ok(Some(serde_yaml::from_value(value.clone())?)),
            _ => Ok(None),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Candidate files for `filename`, nearest first.
///
/// The entrypoint directory is searched, then at most `limit` ancestors. The
/// walk stops after the first directory holding a `.git` directory, so a file
/// at the repository root is used but nothing above it.
pub fn discover_configs(entrypoint: &Path, limit: usize, filename: &str) -> Vec<PathBuf> {
    let mut config_paths = Vec::new();

    for dir in entrypoint.ancestors().take(limit + 1) {
        debug!("Looking in {:?} for {}", dir, filename);
        let candidate = dir.join(filename);
        if candidate.is_file() {
            debug!("Detected config {:?}", candidate);
            config_paths.push(candidate);
        }

        if dir.join(".git").is_dir() {
            debug!("Found project root at {:?}, stopping", dir);
            break;
        }
    }

    config_paths
}

fn read_layer(path: &Path) -> ConfigResult<Mapping> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content)?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        other => Err(ConfigError::InvalidDocument {
            path: path.to_path_buf(),
            message: format!("expected a mapping at the top level, found {:?}", other),
        }),
    }
}

/// Render every layer against the settled union of all layers, then merge.
fn render_and_merge(
    sources: &[PathBuf],
    layers: Vec<Mapping>,
    renderer: &ConfigRenderer,
) -> ConfigResult<Mapping> {
    let raw = merge_layers(layers.iter().cloned());
    let context = renderer.settle_context(&raw).map_err(|message| ConfigError::Template {
        path: sources.last().cloned().unwrap_or_default(),
        message,
    })?;

    let mut merged = Mapping::new();
    for (path, layer) in sources.iter().zip(layers) {
        let rendered = renderer
            .render_mapping(&layer, &context)
            .map_err(|message| ConfigError::Template {
                path: path.clone(),
                message,
            })?;
        merge_mappings(&mut merged, rendered);
    }
    Ok(merged)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
