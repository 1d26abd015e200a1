use serde::{Deserialize, Serialize};
use thunder_config::{ModuleConfig, Record, Schema};
use thunder_core::Deferred;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct S3BucketArgs {
    /// Bucket name, without the sysenv prefix.
    pub name: String,

    /// Canned ACL.
    #[serde(default = "default_acl")]
    pub acl: String,

    #[serde(default = "default_versioning")]
    pub versioning: bool,
}

fn default_acl() -> String {
    "private".to_string()
}

fn default_versioning() -> bool {
    true
}

impl ModuleConfig for S3BucketArgs {
    fn schema() -> Schema {
        Record::new("S3BucketArgs")
            .required("name", Schema::String)
            .with_default("acl", Schema::String)
            .with_default("versioning", Schema::Bool)
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct S3Args {
    pub buckets: Vec<S3BucketArgs>,
}

impl ModuleConfig for S3Args {
    fn schema() -> Schema {
        Record::new("S3Args")
            .required("buckets", Schema::list(Schema::of::<S3BucketArgs>()))
            .into()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct S3Exports {
    /// Full bucket name.
    pub bucket: Deferred<String>,

    /// Bucket name without the sysenv prefix.
    pub friendly_name: String,

    pub bucket_domain_name: Deferred<String>,

    /// Region the bucket lives in.
    pub region: Deferred<String>,
}
