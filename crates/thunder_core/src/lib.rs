//! # thunder_core
//!
//! Building blocks shared by the Thunder crates.
//!
//! - **Memo / MemoMap**: single-evaluation caches
//! - **Deferred**: values resolved later by the orchestration engine
//! - **ExportTree**: flattened module outputs, ready to be published
//! - **Engine**: the seam to the orchestration engine, with an in-process implementation
//! - **ConfigStore**: namespaced raw configuration of the current invocation
//!
//! ## Example
//!
//! ```rust
//! use serde::Serialize;
//! use thunder_core::{flatten, Deferred};
//!
//! #[derive(Serialize)]
//! struct Exports {
//!     bucket: Deferred<String>,
//!     friendly_name: String,
//! }
//!
//! let bucket = Deferred::pending();
//! let tree = flatten(&Exports { bucket: bucket.clone(), friendly_name: "logs".into() }).unwrap();
//! assert!(tree.resolved().is_none());
//!
//! bucket.resolve("prod-logs".to_string()).unwrap();
//! assert_eq!(tree.resolved().unwrap()["bucket"], "prod-logs");
//! ```

pub mod deferred;
pub mod engine;
pub mod error;
pub mod export;
pub mod memo;
pub mod naming;
pub mod store;

pub use deferred::Deferred;
pub use engine::{Engine, LocalEngine, RegisteredResource, Resource, ResourceOptions};
pub use error::{CoreError, CoreResult, ExportError, ExportResult};
pub use export::{flatten, outputs_from_exports, serialize_opaque, ExportTree};
pub use memo::{Memo, MemoMap};
pub use naming::{is_module_dir_name, kebab_from_snake, snake_from_kebab};
pub use store::{ConfigStore, LocalConfigStore};
