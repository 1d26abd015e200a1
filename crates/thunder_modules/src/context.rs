//! Context shared by every module run of a program.

use std::sync::Arc;

use thunder_config::{HierarchicalConfig, LoadOptions, ThunderEnv};
use thunder_core::{ConfigStore, Engine};
use tracing::debug;

use crate::error::ModuleResult;
use crate::manager::ModuleManager;
use crate::stack::CrossStackResolver;

/// Engine, settings, merged configuration and modules of one program run.
///
/// The configuration is fully merged when the context is built, before any
/// module runs.
#[derive(Clone)]
pub struct ThunderContext {
    engine: Arc<dyn Engine>,
    env: Arc<ThunderEnv>,
    manager: Arc<ModuleManager>,
    stacks: Arc<CrossStackResolver>,
}

impl ThunderContext {
    pub fn new(
        engine: Arc<dyn Engine>,
        store: Arc<dyn ConfigStore>,
        config: HierarchicalConfig,
        manager: ModuleManager,
    ) -> Self {
        let env = ThunderEnv::new(Arc::new(config), store, engine.project(), engine.stack());
        let stacks = CrossStackResolver::new(Arc::clone(&engine));
        Self {
            engine,
            env: Arc::new(env),
            manager: Arc::new(manager),
            stacks: Arc::new(stacks),
        }
    }

    /// Build a context, discovering and merging configuration files first.
    pub fn load(
        engine: Arc<dyn Engine>,
        store: Arc<dyn ConfigStore>,
        options: &LoadOptions,
        manager: ModuleManager,
    ) -> ModuleResult<Self> {
        let config = HierarchicalConfig::load(options)?;
        debug!("merged configuration from {:?}", config.sources());
        Ok(Self::new(engine, store, config, manager))
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        self.env.store()
    }

    pub fn config(&self) -> &HierarchicalConfig {
        self.env.config()
    }

    pub fn env(&self) -> &Arc<ThunderEnv> {
        &self.env
    }

    pub fn manager(&self) -> &ModuleManager {
        &self.manager
    }

    pub fn stacks(&self) -> &Arc<CrossStackResolver> {
        &self.stacks
    }
}

impl std::fmt::Debug for ThunderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThunderContext")
            .field("env", &self.env)
            .field("providers", &self.manager.providers())
            .finish()
    }
}
