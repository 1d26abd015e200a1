//! The module contract.
//!
//! A module turns a typed configuration into cloud resources and returns an
//! exports object describing what it built. Every module runs inside a
//! component resource named after its stack:
//!
//! ```text
//! pkg:thunder:aws:s3bucket (component "s3")
//! ├── aws:s3/bucket:Bucket
//! └── aws:s3/bucketPolicy:BucketPolicy
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thunder_config::{HierarchicalConfig, ModuleConfig, ThunderEnv};
use thunder_core::{flatten, ConfigStore, Engine, ExportTree, Resource, ResourceOptions};
use tracing::debug;

use crate::context::ThunderContext;
use crate::error::ModuleResult;
use crate::provider::{Provider, ProviderScope};
use crate::stack::CrossStackResolver;

/// Type token of a module's component resource.
pub fn component_type(provider: Provider, type_name: &str) -> String {
    format!("pkg:thunder:{}:{}", provider.as_str(), type_name.to_lowercase())
}

/// Everything a module instance may use while building.
#[derive(Clone)]
pub struct ModuleScope {
    name: String,
    component: Resource,
    provider: ProviderScope,
    engine: Arc<dyn Engine>,
    env: Arc<ThunderEnv>,
    stacks: Arc<CrossStackResolver>,
}

impl ModuleScope {
    /// Compute the provider conveniences, then register the component
    /// resource for `name`. A missing provider setting registers nothing.
    pub fn new(
        ctx: &ThunderContext,
        name: &str,
        provider: Provider,
        type_name: &str,
        opts: &ResourceOptions,
    ) -> ModuleResult<Self> {
        let type_token = component_type(provider, type_name);
        let provider = ProviderScope::new(provider, ctx.engine().as_ref(), ctx.env())?;
        let component = ctx.engine().register_component(&type_token, name, opts)?;

        Ok(Self {
            name: name.to_string(),
            component,
            provider,
            engine: Arc::clone(ctx.engine()),
            env: Arc::clone(ctx.env()),
            stacks: Arc::clone(ctx.stacks()),
        })
    }

    /// Component name, which is the stack name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &Resource {
        &self.component
    }

    pub fn provider(&self) -> &ProviderScope {
        &self.provider
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn env(&self) -> &ThunderEnv {
        &self.env
    }

    pub fn config(&self) -> &HierarchicalConfig {
        self.env.config()
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        self.env.store()
    }

    pub fn stacks(&self) -> &CrossStackResolver {
        &self.stacks
    }

    /// Options for a resource created directly under the component.
    pub fn child_options(&self) -> ResourceOptions {
        ResourceOptions::new().parent(&self.component)
    }

    /// Register a resource, parented to the component unless `opts` names
    /// another parent.
    pub fn register(
        &self,
        type_token: &str,
        name: &str,
        inputs: impl Into<ExportTree>,
        opts: ResourceOptions,
    ) -> ModuleResult<Resource> {
        let mut opts = opts;
        if opts.parent.is_none() {
            opts.parent = Some(self.component.urn().to_string());
        }
        Ok(self
            .engine
            .register_resource(type_token, name, inputs.into(), &opts)?)
    }
}

impl std::fmt::Debug for ModuleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleScope")
            .field("name", &self.name)
            .field("component", &self.component)
            .field("provider", &self.provider)
            .finish()
    }
}

/// A deployable unit of infrastructure.
pub trait Module: Sized + Send + Sync + 'static {
    /// Typed configuration, read from the stack settings.
    type Config: ModuleConfig;

    /// What the module publishes for other stacks.
    type Exports: Serialize;

    const PROVIDER: Provider;

    /// Type name used in the component type token.
    const TYPE_NAME: &'static str;

    fn new(scope: ModuleScope) -> ModuleResult<Self>;

    fn scope(&self) -> &ModuleScope;

    /// Create cloud resources.
    fn build(&self, config: Self::Config) -> ModuleResult<Self::Exports>;

    /// Build, then flatten the exports and attach them to the component,
    /// keyed by the stack name.
    fn run(&self, config: Self::Config) -> ModuleResult<ExportTree> {
        let scope = self.scope();
        let exports = self.build(config)?;
        let tree = flatten(&exports)?;

        let outputs = ExportTree::Map(BTreeMap::from([(scope.name().to_string(), tree.clone())]));
        scope
            .engine()
            .register_outputs(scope.component(), &outputs)?;

        debug!("module `{}` exported {} deferred values", scope.name(), tree.deferred_leaves().len());
        Ok(tree)
    }
}
