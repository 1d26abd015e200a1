use serde::Serialize;
use serde_json::{json, Value};
use thunder_core::{flatten, Deferred, ResourceOptions};
use tracing::debug;

use super::config::{S3Args, S3BucketArgs, S3Exports};
use crate::error::ModuleResult;
use crate::module::{Module, ModuleScope};
use crate::provider::Provider;

const GET_ORGANIZATION: &str = "aws:organizations/getOrganization:getOrganization";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicAccessBlockInputs {
    bucket: Deferred<Value>,
    block_public_acls: bool,
    block_public_policy: bool,
    ignore_public_acls: bool,
    restrict_public_buckets: bool,
}

#[derive(Serialize)]
struct BucketPolicyInputs {
    bucket: Deferred<Value>,
    policy: Deferred<Value>,
}

pub struct S3Bucket {
    scope: ModuleScope,
}

impl S3Bucket {
    fn create_bucket(&self, args: &S3BucketArgs, organization: &Deferred<Value>) -> ModuleResult<S3Exports> {
        let scope = &self.scope;
        let hash_name = scope.env().bucket_name(&args.name)?;
        debug!("creating bucket `{}` for `{}`", hash_name, args.name);

        let bucket = scope.register(
            "aws:s3/bucket:Bucket",
            &hash_name,
            json!({
                "bucket": hash_name,
                "acl": args.acl,
                "versioning": { "enabled": args.versioning },
                "tags": scope.env().tags(scope.name(), "bucket", Some(&args.name))?,
            }),
            ResourceOptions::new().ignore_changes(&["lifecycleRules", "replicationConfiguration"]),
        )?;

        let access_block = scope.register(
            "aws:s3/bucketPublicAccessBlock:BucketPublicAccessBlock",
            &hash_name,
            flatten(&PublicAccessBlockInputs {
                bucket: bucket.output("id"),
                block_public_acls: true,
                block_public_policy: true,
                ignore_public_acls: true,
                restrict_public_buckets: true,
            })?,
            ResourceOptions::new().parent(&bucket),
        )?;

        let policy_id = hash_name.clone();
        let policy = bucket
            .output_str("arn")
            .zip(organization)
            .map(move |(arn, organization)| org_only_policy(&policy_id, &arn, &organization["id"]));

        scope.register(
            "aws:s3/bucketPolicy:BucketPolicy",
            &format!("{}-org-only-policy", hash_name),
            flatten(&BucketPolicyInputs {
                bucket: bucket.output("id"),
                policy,
            })?,
            ResourceOptions::new().parent(&access_block),
        )?;

        Ok(S3Exports {
            bucket: bucket.output_str("bucket"),
            friendly_name: args.name.clone(),
            bucket_domain_name: bucket.output_str("bucketDomainName"),
            region: bucket.output_str("region"),
        })
    }
}

/// Deny every principal outside the organization.
fn org_only_policy(hash_name: &str, arn: &str, organization_id: &Value) -> Value {
    json!({
        "Version": "2012-10-17",
        "Id": format!("{}-Policy", hash_name),
        "Statement": [{
            "Sid": format!("{}-DenyEverythingExceptOrg", hash_name),
            "Effect": "Deny",
            "Principal": "*",
            "Action": "*:*",
            "Resource": [arn, format!("{}/*", arn)],
            "Condition": { "StringNotEquals": { "aws:PrincipalOrgID": organization_id } },
        }],
    })
}

impl Module for S3Bucket {
    type Config = S3Args;
    type Exports = Vec<S3Exports>;

    const PROVIDER: Provider = Provider::Aws;
    const TYPE_NAME: &'static str = "S3Bucket";

    fn new(scope: ModuleScope) -> ModuleResult<Self> {
        Ok(Self { scope })
    }

    fn scope(&self) -> &ModuleScope {
        &self.scope
    }

    fn build(&self, config: S3Args) -> ModuleResult<Vec<S3Exports>> {
        let organization = self.scope.engine().invoke(GET_ORGANIZATION, json!({}))?;
        config
            .buckets
            .iter()
            .map(|args| self.create_bucket(args, &organization))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_only_policy() {
        let policy = org_only_policy(
            "sandbox-dev-abcde-logs",
            "arn:aws:s3:::sandbox-dev-abcde-logs",
            &json!("o-12345"),
        );
        let statement = &policy["Statement"][0];
        assert_eq!(policy["Id"], "sandbox-dev-abcde-logs-Policy");
        assert_eq!(statement["Effect"], "Deny");
        assert_eq!(statement["Resource"][1], "arn:aws:s3:::sandbox-dev-abcde-logs/*");
        assert_eq!(
            statement["Condition"]["StringNotEquals"]["aws:PrincipalOrgID"],
            "o-12345"
        );
    }
}
