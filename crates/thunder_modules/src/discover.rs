//! Module discovery.
//!
//! Modules live at `{package_root}/modules/{provider}/{module}`:
//!
//! ```text
//! thunder_modules/src
//! └── modules
//!     ├── aws
//!     │   ├── s3
//!     │   └── iam_roles        -> "iam-roles"
//!     └── shared
//!         ├── seed
//!         └── _deprecated      (skipped)
//! ```
//!
//! Only the directory layout is read. Definitions are looked up in the
//! [`ModuleCatalog`] when a module is first resolved.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thunder_core::{is_module_dir_name, kebab_from_snake};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::catalog::ModuleCatalog;
use crate::error::{ModuleError, ModuleResult};
use crate::lazy::LazyModule;

/// Directory holding the provider directories.
pub const MODULE_CONTAINER: &str = "modules";

/// Providers to module names (kebab case) to lazy modules.
pub type ModuleTree = BTreeMap<String, BTreeMap<String, Arc<LazyModule>>>;

/// Walk up from `start` to the directory named `package_name`.
pub fn find_package_root(start: &Path, package_name: &str) -> ModuleResult<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.file_name().map_or(false, |name| name == package_name))
        .map(Path::to_path_buf)
        .ok_or_else(|| ModuleError::PackageRootNotFound {
            package: package_name.to_string(),
            start: start.to_path_buf(),
        })
}

/// Every known module, grouped by provider.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: ModuleTree,
}

impl ModuleRegistry {
    /// Discover modules below `package_root`.
    pub fn discover(package_root: &Path, catalog: Arc<ModuleCatalog>) -> ModuleResult<Self> {
        let providers_path = package_root.join(MODULE_CONTAINER);
        debug!("identified module directory as {:?}", providers_path);

        let mut registry = Self::default();
        for provider in module_dirs(&providers_path)? {
            for name in module_dirs(&providers_path.join(&provider))? {
                registry.insert(LazyModule::new(&provider, &name, Arc::clone(&catalog)))?;
            }
        }

        debug!("discovered modules {:?}", registry.names());
        Ok(registry)
    }

    /// Build the registry from the catalog alone, without reading the
    /// filesystem.
    pub fn from_catalog(catalog: Arc<ModuleCatalog>) -> ModuleResult<Self> {
        let mut registry = Self::default();
        for definition in catalog.definitions() {
            let key = kebab_from_snake(definition.name());
            let known = registry
                .modules
                .get(definition.provider())
                .map_or(false, |modules| modules.contains_key(&key));
            // Definitions sharing a path are reported when the module resolves.
            if !known {
                registry.insert(LazyModule::new(
                    definition.provider(),
                    definition.name(),
                    Arc::clone(&catalog),
                ))?;
            }
        }
        Ok(registry)
    }

    fn insert(&mut self, module: LazyModule) -> ModuleResult<()> {
        let key = kebab_from_snake(module.name());
        let modules = self.modules.entry(module.provider().to_string()).or_default();
        if let Some(existing) = modules.get(&key) {
            return Err(ModuleError::NameCollision {
                provider: module.provider().to_string(),
                name: key,
                first: existing.path(),
                second: module.path(),
            });
        }
        modules.insert(key, Arc::new(module));
        Ok(())
    }

    pub fn modules(&self) -> &ModuleTree {
        &self.modules
    }

    pub fn into_modules(self) -> ModuleTree {
        self.modules
    }

    /// `(provider, module)` pairs, sorted.
    pub fn names(&self) -> Vec<(String, String)> {
        self.modules
            .iter()
            .flat_map(|(provider, modules)| {
                modules
                    .keys()
                    .map(move |name| (provider.clone(), name.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immediate subdirectories of `path` that may hold modules, sorted.
fn module_dirs(path: &Path) -> ModuleResult<Vec<String>> {
    if !path.is_dir() {
        warn!("module directory {:?} does not exist", path);
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            warn!("cannot read module directory under {:?}: {}", path, e);
            io::Error::from(e)
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            warn!("skipping non UTF-8 directory {:?}", entry.path());
            continue;
        };
        if name.starts_with('_') {
            continue;
        }
        if !is_module_dir_name(name) {
            warn!("skipping directory {:?}: not a valid module name", entry.path());
            continue;
        }
        dirs.push(name.to_string());
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn layout(root: &Path, dirs: &[&str]) {
        for dir in dirs {
            fs::create_dir_all(root.join(MODULE_CONTAINER).join(dir)).unwrap();
        }
    }

    #[test]
    fn test_discover_layout() {
        let root = tempdir().unwrap();
        layout(
            root.path(),
            &[
                "aws/s3",
                "aws/iam_roles",
                "aws/_deprecated/rabbitmq",
                "aws/bad-name",
                "azure/storage",
                "_private/thing",
            ],
        );
        fs::write(root.path().join(MODULE_CONTAINER).join("aws").join("mod.rs"), "").unwrap();

        let registry =
            ModuleRegistry::discover(root.path(), Arc::new(ModuleCatalog::new())).unwrap();

        assert_eq!(
            registry.names(),
            vec![
                ("aws".to_string(), "iam-roles".to_string()),
                ("aws".to_string(), "s3".to_string()),
                ("azure".to_string(), "storage".to_string()),
            ]
        );
        let iam = &registry.modules()["aws"]["iam-roles"];
        assert_eq!(iam.name(), "iam_roles");
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_follows_links_and_reports_broken_ones() {
        use std::os::unix::fs::symlink;

        let shared = tempdir().unwrap();
        fs::create_dir_all(shared.path().join("seed")).unwrap();

        let root = tempdir().unwrap();
        layout(root.path(), &["aws/s3"]);
        symlink(shared.path(), root.path().join(MODULE_CONTAINER).join("shared")).unwrap();

        let registry =
            ModuleRegistry::discover(root.path(), Arc::new(ModuleCatalog::new())).unwrap();
        assert!(registry.modules()["shared"].contains_key("seed"));

        symlink(
            root.path().join("nowhere"),
            root.path().join(MODULE_CONTAINER).join("aws").join("vpc"),
        )
        .unwrap();
        let err = ModuleRegistry::discover(root.path(), Arc::new(ModuleCatalog::new())).unwrap_err();
        assert!(matches!(err, ModuleError::Io(_)));
    }

    #[test]
    fn test_discover_missing_container() {
        let root = tempdir().unwrap();
        let registry =
            ModuleRegistry::discover(root.path(), Arc::new(ModuleCatalog::new())).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_package_root() {
        let root = tempdir().unwrap();
        let nested = root.path().join("thunder_modules").join("src").join("modules");
        fs::create_dir_all(&nested).unwrap();

        let found = find_package_root(&nested, "thunder_modules").unwrap();
        assert_eq!(found, root.path().join("thunder_modules"));

        let err = find_package_root(&nested, "infra_thunder").unwrap_err();
        assert!(matches!(err, ModuleError::PackageRootNotFound { .. }));
    }

    #[test]
    fn test_from_catalog() {
        let catalog = Arc::new(ModuleCatalog::builtin().unwrap());
        let registry = ModuleRegistry::from_catalog(catalog).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.modules()["shared"].contains_key("seed"));
        assert!(registry.modules()["aws"].contains_key("s3"));
    }

    #[test]
    fn test_crate_layout_matches_catalog() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
        let catalog = Arc::new(ModuleCatalog::builtin().unwrap());
        let discovered = ModuleRegistry::discover(&root, Arc::clone(&catalog)).unwrap();
        let compiled = ModuleRegistry::from_catalog(catalog).unwrap();
        assert_eq!(discovered.names(), compiled.names());
    }
}
