//! Modules shipped with Thunder, one directory per module.

pub mod aws;
pub mod shared;
