//! S3 buckets, private to the organization.

mod config;
mod module;

pub use config::{S3Args, S3BucketArgs, S3Exports};
pub use module::S3Bucket;
