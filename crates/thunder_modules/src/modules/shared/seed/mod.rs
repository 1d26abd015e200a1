//! Random seed shared by other stacks, e.g. to derive unique names.

mod config;
mod module;

pub use config::{SeedConfig, SeedExports};
pub use module::Seed;
