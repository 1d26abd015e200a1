//! Hands out modules by provider and name.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::discover::{ModuleRegistry, ModuleTree};
use crate::error::{ModuleError, ModuleResult};
use crate::lazy::LazyModule;

/// Stores and hands out modules.
///
/// ```text
/// {
///     "shared": { "seed": LazyModule(shared, seed) },
///     "aws":    { "s3": LazyModule(aws, s3), "iam-roles": LazyModule(aws, iam_roles) },
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModuleManager {
    modules: ModuleTree,
}

impl ModuleManager {
    pub fn new(registry: ModuleRegistry) -> Self {
        let modules = registry.into_modules();
        debug!("managing {} providers", modules.len());
        Self { modules }
    }

    /// The module registered as `name` (kebab case) under `provider`.
    pub fn get(&self, provider: &str, name: &str) -> ModuleResult<Arc<LazyModule>> {
        let module = self
            .modules
            .get(provider)
            .and_then(|modules| modules.get(name))
            .ok_or_else(|| ModuleError::ModuleNotFound {
                provider: provider.to_string(),
                module: name.to_string(),
            })?;

        debug!("accessing module {:?}", module);
        Ok(Arc::clone(module))
    }

    pub fn get_provider_modules(
        &self,
        provider: &str,
    ) -> ModuleResult<&BTreeMap<String, Arc<LazyModule>>> {
        self.modules
            .get(provider)
            .ok_or_else(|| ModuleError::ProviderNotFound(provider.to_string()))
    }

    pub fn get_all_modules(&self) -> &ModuleTree {
        &self.modules
    }

    pub fn providers(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, provider: &str, name: &str) -> bool {
        self.modules
            .get(provider)
            .map_or(false, |modules| modules.contains_key(name))
    }
}
