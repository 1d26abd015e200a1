//! Environment conventions derived from the merged configuration.
//!
//! A *sysenv* names one deployment environment:
//! `{namespace}-{provider}-{region}-{purpose}-{phase}`, for example
//! `co-aws-us-west-2-sandbox-dev`.

use std::collections::BTreeMap;
use std::sync::Arc;

use md5::{Digest, Md5};
use thunder_core::{ConfigStore, Memo};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::hierarchical::HierarchicalConfig;

const DEFAULT_TAG_NAMESPACE: &str = "thunder";
const DEFAULT_TAG_SEPARATOR: &str = ":";

/// Environment helpers over the merged configuration and the stack settings.
pub struct ThunderEnv {
    config: Arc<HierarchicalConfig>,
    store: Arc<dyn ConfigStore>,
    project: String,
    stack: String,
    sysenv: Memo<String>,
}

impl ThunderEnv {
    pub fn new(
        config: Arc<HierarchicalConfig>,
        store: Arc<dyn ConfigStore>,
        project: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            config,
            store,
            project: project.into(),
            stack: stack.into(),
            sysenv: Memo::new(),
        }
    }

    pub fn config(&self) -> &HierarchicalConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Prefix namespace of the standard resource tags.
    pub fn tag_namespace(&self) -> String {
        self.config.get_str_or("tag_namespace", DEFAULT_TAG_NAMESPACE)
    }

    pub fn tag_prefix(&self) -> String {
        format!(
            "{}{}",
            self.tag_namespace(),
            self.config.get_str_or("tag_separator", DEFAULT_TAG_SEPARATOR)
        )
    }

    pub fn team(&self) -> ConfigResult<String> {
        self.config.require_str("team")
    }

    pub fn purpose(&self) -> ConfigResult<String> {
        self.config.require_str("purpose")
    }

    pub fn phase(&self) -> ConfigResult<String> {
        self.config.require_str("phase")
    }

    /// `("aws", region)` or `("az", location)` depending on which provider
    /// is configured for the stack.
    pub fn provider_and_region(&self) -> ConfigResult<(String, String)> {
        if let Some(region) = self.store.get_in("aws", "region").filter(|r| !r.is_empty()) {
            return Ok(("aws".to_string(), region));
        }
        if let Some(location) = self
            .store
            .get_in("azure-native", "location")
            .filter(|l| !l.is_empty())
        {
            return Ok(("az".to_string(), location));
        }
        Err(ConfigError::UnknownProvider)
    }

    /// Name of the current sysenv. `sysenv` in the configuration overrides
    /// the computed name. Computed once.
    pub fn sysenv(&self) -> ConfigResult<String> {
        self.sysenv
            .get_or_try_init(|| -> ConfigResult<String> {
                if let Some(sysenv) = self.config.get("sysenv").and_then(|v| v.as_str()) {
                    return Ok(sysenv.to_string());
                }
                let namespace = self.config.require_str("namespace")?;
                let (provider, region) = self.provider_and_region()?;
                let sysenv = format!(
                    "{}-{}-{}-{}-{}",
                    namespace,
                    provider,
                    region,
                    self.purpose()?,
                    self.phase()?
                );
                debug!("sysenv is `{}`", sysenv);
                Ok(sysenv)
            })
            .cloned()
    }

    /// e.g. `co-aws-us-west-2-sandbox-dev.thunder`
    pub fn internal_sysenv_domain(&self) -> ConfigResult<String> {
        Ok(format!("{}.{}", self.sysenv()?, self.tag_namespace()))
    }

    pub fn public_base_domain(&self) -> ConfigResult<String> {
        self.config.require_str("public_base_domain")
    }

    pub fn public_sysenv_domain(&self) -> ConfigResult<String> {
        Ok(format!("{}.{}", self.sysenv()?, self.public_base_domain()?))
    }

    /// `thunder:provider`, used to run a stack with another provider's modules.
    pub fn provider_override(&self) -> Option<String> {
        self.store
            .get_in("thunder", "provider")
            .filter(|p| !p.is_empty())
    }

    /// Standard tags for a resource.
    ///
    /// `service` is the resource's namespace (kubernetes, subnet), `role` what
    /// it does there (controller, public) and `group` the group it belongs to,
    /// `main` when not given.
    pub fn tags(
        &self,
        service: &str,
        role: &str,
        group: Option<&str>,
    ) -> ConfigResult<BTreeMap<String, String>> {
        let prefix = self.tag_prefix();
        let name = match group {
            Some(group) => format!("{}-{}-{}", service, role, group),
            None => format!("{}-{}", service, role),
        };

        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), name);
        let mut tag = |key: &str, value: String| {
            tags.insert(format!("{}{}", prefix, key), value);
        };
        tag("sysenv", self.sysenv()?);
        tag("service", service.to_string());
        tag("role", role.to_string());
        tag("group", group.unwrap_or("main").to_string());
        tag("team", self.team()?);
        tag("createdby", "thunder".to_string());
        tag("stack", self.stack.clone());
        tag("project", self.project.clone());
        tag("purpose", self.purpose()?);
        tag("phase", self.phase()?);
        Ok(tags)
    }

    /// Globally unique bucket name: `{purpose}-{phase}-{hash}-{name}` where
    /// `hash` is the last five hex digits of the sysenv's MD5, so names stay
    /// stable for buckets that already exist.
    pub fn bucket_name(&self, name: &str) -> ConfigResult<String> {
        let digest = hex::encode(Md5::digest(self.sysenv()?.as_bytes()));
        let hash = &digest[digest.len() - 5..];
        Ok(format!("{}-{}-{}-{}", self.purpose()?, self.phase()?, hash, name))
    }
}

impl std::fmt::Debug for ThunderEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThunderEnv")
            .field("project", &self.project)
            .field("stack", &self.stack)
            .field("sources", &self.config.sources())
            .finish()
    }
}
