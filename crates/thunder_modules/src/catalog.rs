//! Compiled module definitions.
//!
//! Modules are registered under the directory path they live at,
//! `modules/{provider}/{name}`. Resolution of a discovered directory looks
//! its definition up here.

use std::any::TypeId;
use std::fmt;

use thunder_config::{get_stack_config, ModuleConfig, Schema};
use thunder_core::{is_module_dir_name, ExportTree, ResourceOptions};
use tracing::debug;

use crate::context::ThunderContext;
use crate::error::{ModuleError, ModuleResult};
use crate::module::{Module, ModuleScope};
use crate::modules::{aws::s3::S3Bucket, shared::seed::Seed};

type RunFn = fn(&ThunderContext, &str, &ResourceOptions) -> ModuleResult<ExportTree>;

/// A registered module type.
#[derive(Clone)]
pub struct ModuleDefinition {
    provider: String,
    name: String,
    type_name: &'static str,
    type_id: TypeId,
    schema: fn() -> Schema,
    run: RunFn,
}

impl ModuleDefinition {
    /// Definition of `M`, living at `modules/{M::PROVIDER}/{name}`.
    pub fn of<M: Module>(name: &str) -> Self {
        Self {
            provider: M::PROVIDER.as_str().to_string(),
            name: name.to_string(),
            type_name: M::TYPE_NAME,
            type_id: TypeId::of::<M>(),
            schema: <M::Config as ModuleConfig>::schema,
            run: run_module::<M>,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Directory name, snake case.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn path(&self) -> String {
        module_path(&self.provider, &self.name)
    }

    /// Configuration schema of the module.
    pub fn schema(&self) -> Schema {
        (self.schema)()
    }

    /// Read the stack's configuration, construct the module and run it.
    pub fn run(
        &self,
        ctx: &ThunderContext,
        stack: &str,
        opts: &ResourceOptions,
    ) -> ModuleResult<ExportTree> {
        (self.run)(ctx, stack, opts)
    }
}

impl fmt::Debug for ModuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDefinition")
            .field("path", &self.path())
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn run_module<M: Module>(
    ctx: &ThunderContext,
    stack: &str,
    opts: &ResourceOptions,
) -> ModuleResult<ExportTree> {
    let config: M::Config = get_stack_config(ctx.store().as_ref(), stack)?;
    let scope = ModuleScope::new(ctx, stack, M::PROVIDER, M::TYPE_NAME, opts)?;
    M::new(scope)?.run(config)
}

/// `modules/{provider}/{name}`
pub fn module_path(provider: &str, name: &str) -> String {
    format!("modules/{}/{}", provider, name)
}

/// Every module type known to the program.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    definitions: Vec<ModuleDefinition>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The modules shipped with Thunder.
    pub fn builtin() -> ModuleResult<Self> {
        Self::new()
            .with::<Seed>("seed")?
            .with::<S3Bucket>("s3")
    }

    pub fn with<M: Module>(mut self, name: &str) -> ModuleResult<Self> {
        self.register::<M>(name)?;
        Ok(self)
    }

    /// Register `M` under `modules/{M::PROVIDER}/{name}`.
    pub fn register<M: Module>(&mut self, name: &str) -> ModuleResult<()> {
        self.register_definition(ModuleDefinition::of::<M>(name))
    }

    pub fn register_definition(&mut self, definition: ModuleDefinition) -> ModuleResult<()> {
        if !is_module_dir_name(&definition.name) {
            return Err(ModuleError::InvalidModuleName(definition.name));
        }
        if self
            .definitions
            .iter()
            .any(|d| d.type_id == definition.type_id && d.path() == definition.path())
        {
            return Err(ModuleError::DuplicateModule {
                path: definition.path(),
                type_name: definition.type_name.to_string(),
            });
        }

        debug!("Registering module {} at `{}`", definition.type_name, definition.path());
        self.definitions.push(definition);
        Ok(())
    }

    /// Definitions registered at `modules/{provider}/{name}`.
    pub fn candidates(&self, provider: &str, name: &str) -> Vec<&ModuleDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.provider == provider && d.name == name)
            .collect()
    }

    pub fn definitions(&self) -> &[ModuleDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = ModuleCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 2);

        let seed = catalog.candidates("shared", "seed");
        assert_eq!(seed.len(), 1);
        assert_eq!(seed[0].path(), "modules/shared/seed");
        assert!(catalog.candidates("aws", "seed").is_empty());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut catalog = ModuleCatalog::builtin().unwrap();
        let err = catalog.register::<Seed>("seed").unwrap_err();
        assert!(matches!(err, ModuleError::DuplicateModule { .. }));

        // The same type may live at a second path.
        catalog.register::<Seed>("seed_v2").unwrap();
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = ModuleCatalog::new().register::<Seed>("iam-roles").unwrap_err();
        assert!(matches!(err, ModuleError::InvalidModuleName(name) if name == "iam-roles"));
    }
}
