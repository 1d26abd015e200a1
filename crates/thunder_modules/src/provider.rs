//! Provider namespaces and the conveniences each one offers to its modules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thunder_config::{ConfigError, ThunderEnv};
use thunder_core::{Deferred, Engine};

use crate::error::ModuleResult;

/// Namespaces modules are grouped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Cloudflare,
    Shared,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Cloudflare => "cloudflare",
            Provider::Shared => "shared",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aws" => Some(Provider::Aws),
            "azure" => Some(Provider::Azure),
            "cloudflare" => Some(Provider::Cloudflare),
            "shared" => Some(Provider::Shared),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Provider::Aws,
            Provider::Azure,
            Provider::Cloudflare,
            Provider::Shared,
        ]
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// AWS account facts, looked up once per module instance.
#[derive(Debug, Clone)]
pub struct AwsScope {
    pub region: String,
    pub account_id: Deferred<String>,
    pub partition: Deferred<String>,
}

/// Azure resource group facts. The resource group is named after the sysenv.
#[derive(Debug, Clone)]
pub struct AzureScope {
    pub location: String,
    pub resource_group_name: String,
    pub resource_group_id: Deferred<String>,
}

impl AzureScope {
    /// Arguments shared by most Azure resources.
    pub fn common_args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("resource_group_name".to_string(), self.resource_group_name.clone()),
            ("location".to_string(), self.location.clone()),
        ])
    }

    /// Full id of a resource in the module's resource group, e.g.
    /// `{group}/providers/Microsoft.Network/loadBalancers/lb/backendAddressPools/be-lb`.
    ///
    /// The child type and name may be empty to address the parent itself.
    pub fn build_resource_id(
        &self,
        namespace: &str,
        parent_type: &str,
        parent_name: &str,
        resource_type: &str,
        resource_name: &str,
    ) -> Deferred<String> {
        let mut suffix = format!("/providers/{}/{}/{}", namespace, parent_type, parent_name);
        if !resource_type.is_empty() || !resource_name.is_empty() {
            suffix.push_str(&format!("/{}/{}", resource_type, resource_name));
        }
        self.resource_group_id.map(move |group| format!("{}{}", group, suffix))
    }
}

/// Provider-specific conveniences, computed when the module is constructed.
#[derive(Debug, Clone)]
pub enum ProviderScope {
    Aws(AwsScope),
    Azure(AzureScope),
    Cloudflare,
    Shared,
}

impl ProviderScope {
    pub fn new(provider: Provider, engine: &dyn Engine, env: &ThunderEnv) -> ModuleResult<Self> {
        Ok(match provider {
            Provider::Aws => ProviderScope::Aws(aws_scope(engine, env)?),
            Provider::Azure => ProviderScope::Azure(azure_scope(engine, env)?),
            Provider::Cloudflare => ProviderScope::Cloudflare,
            Provider::Shared => ProviderScope::Shared,
        })
    }

    pub fn provider(&self) -> Provider {
        match self {
            ProviderScope::Aws(_) => Provider::Aws,
            ProviderScope::Azure(_) => Provider::Azure,
            ProviderScope::Cloudflare => Provider::Cloudflare,
            ProviderScope::Shared => Provider::Shared,
        }
    }

    pub fn aws(&self) -> Option<&AwsScope> {
        match self {
            ProviderScope::Aws(scope) => Some(scope),
            _ => None,
        }
    }

    pub fn azure(&self) -> Option<&AzureScope> {
        match self {
            ProviderScope::Azure(scope) => Some(scope),
            _ => None,
        }
    }
}

fn require_setting(env: &ThunderEnv, namespace: &str, key: &str) -> ModuleResult<String> {
    env.store()
        .get_in(namespace, key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ConfigError::MissingKey {
                key: format!("{}:{}", namespace, key),
            }
            .into()
        })
}

fn string_field(result: Deferred<Value>, field: &'static str) -> Deferred<String> {
    result.map(move |value| {
        value
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    })
}

fn aws_scope(engine: &dyn Engine, env: &ThunderEnv) -> ModuleResult<AwsScope> {
    let region = require_setting(env, "aws", "region")?;
    let identity = engine.invoke("aws:index/getCallerIdentity:getCallerIdentity", json!({}))?;
    let partition = engine.invoke("aws:index/getPartition:getPartition", json!({}))?;

    Ok(AwsScope {
        region,
        account_id: string_field(identity, "accountId"),
        partition: string_field(partition, "partition"),
    })
}

fn azure_scope(engine: &dyn Engine, env: &ThunderEnv) -> ModuleResult<AzureScope> {
    let location = require_setting(env, "azure-native", "location")?;
    let resource_group_name = env.sysenv()?;
    let group = engine.invoke(
        "azure-native:resources:getResourceGroup",
        json!({ "resourceGroupName": resource_group_name }),
    )?;

    Ok(AzureScope {
        location,
        resource_group_name,
        resource_group_id: string_field(group, "id"),
    })
}
