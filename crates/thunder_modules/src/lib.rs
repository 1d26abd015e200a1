//! # thunder_modules
//!
//! Modules and the machinery that runs them.
//!
//! A stack is named after the module it deploys. Running a stack looks the
//! module up by provider and name, reads the stack's settings into the
//! module's typed configuration, builds the resources and exports the result
//! under the stack name.
//!
//! # Architecture
//!
//! - **Module**: the contract every module implements
//! - **ModuleCatalog**: compiled-in module definitions
//! - **ModuleRegistry**: module directories discovered under a package root
//! - **LazyModule**: a module resolved on first use
//! - **ModuleManager**: hands out modules by provider and name
//! - **CrossStackResolver**: memoized lookups into other stacks' outputs
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use thunder_core::{LocalConfigStore, LocalEngine};
//! use thunder_modules::{run_active_stack, ModuleCatalog, ModuleManager, ModuleRegistry, ThunderContext};
//!
//! let catalog = Arc::new(ModuleCatalog::builtin()?);
//! let manager = ModuleManager::new(ModuleRegistry::from_catalog(catalog)?);
//! let ctx = ThunderContext::load(engine, store, &LoadOptions::new(), manager)?;
//!
//! let exports = run_active_stack(&ctx, "aws")?;
//! ```

pub mod catalog;
pub mod context;
pub mod discover;
pub mod error;
pub mod launcher;
pub mod lazy;
pub mod manager;
pub mod module;
pub mod modules;
pub mod provider;
pub mod stack;

pub use catalog::{module_path, ModuleCatalog, ModuleDefinition};
pub use context::ThunderContext;
pub use discover::{find_package_root, ModuleRegistry, ModuleTree, MODULE_CONTAINER};
pub use error::{ModuleError, ModuleResult, StackError, StackResult};
pub use launcher::{run_active_stack, run_stack};
pub use lazy::{LazyModule, ResolvedModule};
pub use manager::ModuleManager;
pub use module::{component_type, Module, ModuleScope};
pub use provider::{AwsScope, AzureScope, Provider, ProviderScope};
pub use stack::{CrossStackResolver, DEFAULT_MATCH_FIELD};
