//! # thunder_config
//!
//! Configuration for Thunder stacks:
//!
//! - **HierarchicalConfig**: `Thunder.common.yaml` files merged from the entrypoint upward
//! - **ConfigRenderer**: Jinja2-style templating of configuration values
//! - **mapper**: raw stack settings to typed, validated module configuration
//! - **Schema**: structural description used by the validator
//! - **ThunderEnv**: sysenv, domain and tagging conventions

pub mod env;
pub mod error;
pub mod hierarchical;
pub mod mapper;
pub mod merge;
pub mod schema;
pub mod template;

pub use env::ThunderEnv;
pub use error::{ConfigError, ConfigResult};
pub use hierarchical::{discover_configs, HierarchicalConfig, LoadOptions, DEFAULT_FILENAME};
pub use mapper::{convert, get_raw_stack_config, get_stack_config, normalize, RawConfig};
pub use merge::{deep_merge, merge_layers};
pub use schema::{validate, EnumSchema, EnumVariant, Field, ModuleConfig, Presence, Record, Schema};
pub use template::ConfigRenderer;
