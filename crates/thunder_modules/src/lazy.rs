//! Lazily resolved modules.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thunder_config::Schema;
use thunder_core::{ExportTree, Memo, ResourceOptions};
use tracing::{debug, info};

use crate::catalog::{module_path, ModuleCatalog, ModuleDefinition};
use crate::context::ThunderContext;
use crate::error::{ModuleError, ModuleResult};

/// A module definition together with its configuration schema.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub definition: ModuleDefinition,
    pub schema: Schema,
}

/// A discovered module whose definition is looked up on first use.
pub struct LazyModule {
    provider: String,
    name: String,
    catalog: Arc<ModuleCatalog>,
    resolved: Memo<ResolvedModule>,
    resolutions: AtomicUsize,
}

impl LazyModule {
    /// `name` is the directory name, snake case.
    pub fn new(provider: &str, name: &str, catalog: Arc<ModuleCatalog>) -> Self {
        Self {
            provider: provider.to_string(),
            name: name.to_string(),
            catalog,
            resolved: Memo::new(),
            resolutions: AtomicUsize::new(0),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> String {
        module_path(&self.provider, &self.name)
    }

    /// Look the definition up. Succeeds at most once; later calls return the
    /// cached result.
    pub fn resolve(&self) -> ModuleResult<&ResolvedModule> {
        self.resolved.get_or_try_init(|| {
            self.resolutions.fetch_add(1, Ordering::SeqCst);
            let path = self.path();
            debug!("performing first-time resolution for module at `{}`", path);

            let candidates = self.catalog.candidates(&self.provider, &self.name);
            let definition = match candidates.as_slice() {
                [] => return Err(ModuleError::NoModuleDefinition { path }),
                [definition] => (*definition).clone(),
                many => {
                    return Err(ModuleError::AmbiguousModule {
                        path,
                        candidates: many
                            .iter()
                            .map(|d| d.type_name())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                }
            };

            let schema = definition.schema();
            if schema == Schema::Any {
                return Err(ModuleError::MissingConfigType { path });
            }

            debug!("found module `{}`", definition.type_name());
            Ok(ResolvedModule { definition, schema })
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_initialized()
    }

    /// Number of times resolution actually ran.
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    /// Run the module for `stack_name` with that stack's configuration.
    pub fn run(
        &self,
        ctx: &ThunderContext,
        stack_name: &str,
        opts: Option<ResourceOptions>,
    ) -> ModuleResult<ExportTree> {
        let resolved = self.resolve()?;
        info!("running module `{}` for stack `{}`", self.name, stack_name);
        resolved
            .definition
            .run(ctx, stack_name, &opts.unwrap_or_default())
    }
}

impl fmt::Debug for LazyModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyModule")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
