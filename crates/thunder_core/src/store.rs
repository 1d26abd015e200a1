//! Raw configuration provided by the orchestration engine.
//!
//! Keys are namespaced as `"{namespace}:{key}"` (`aws:region`, `s3:buckets`)
//! and values are strings, possibly JSON-encoded structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Read access to the raw configuration of the current invocation.
pub trait ConfigStore: Send + Sync {
    /// Every key/value pair, keys fully namespaced.
    fn entries(&self) -> Vec<(String, String)>;

    /// A single value by its fully namespaced key.
    fn get(&self, key: &str) -> Option<String>;

    /// A value by namespace and key.
    fn get_in(&self, namespace: &str, key: &str) -> Option<String> {
        self.get(&format!("{}:{}", namespace, key))
    }
}

/// In-memory configuration store.
#[derive(Debug, Clone, Default)]
pub struct LocalConfigStore {
    values: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct StackFile {
    #[serde(default)]
    config: BTreeMap<String, YamlValue>,
}

impl LocalConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Load a stack settings file.
    ///
    /// The file holds a `config:` map of namespaced keys. Scalars are stored as
    /// their textual form, structured values are re-encoded as JSON. A null
    /// value leaves the key unset.
    pub fn from_stack_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        debug!("Loading stack settings from {:?}", path);

        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content).map_err(|e| CoreError::InvalidStackFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        let file: StackFile = if content.trim().is_empty() {
            StackFile {
                config: BTreeMap::new(),
            }
        } else {
            serde_yaml::from_str(content)?
        };

        let mut store = Self::new();
        for (key, value) in file.config {
            if let Some(encoded) = encode_value(value)? {
                store.set(key, encoded);
            }
        }
        Ok(store)
    }
}

fn encode_value(value: YamlValue) -> CoreResult<Option<String>> {
    Ok(Some(match value {
        YamlValue::Null => return Ok(None),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::String(s) => s,
        structured => serde_json::to_string(&serde_json::to_value(structured)?)?,
    }))
}

impl ConfigStore for LocalConfigStore {
    fn entries(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
