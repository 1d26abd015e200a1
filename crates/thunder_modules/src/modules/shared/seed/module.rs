use serde_json::json;
use thunder_core::{Deferred, ResourceOptions};

use super::config::{SeedConfig, SeedExports, DEFAULT_BYTE_LENGTH};
use crate::error::ModuleResult;
use crate::module::{Module, ModuleScope};
use crate::provider::Provider;

pub struct Seed {
    scope: ModuleScope,
}

impl Module for Seed {
    type Config = SeedConfig;
    type Exports = SeedExports;

    const PROVIDER: Provider = Provider::Shared;
    const TYPE_NAME: &'static str = "Seed";

    fn new(scope: ModuleScope) -> ModuleResult<Self> {
        Ok(Self { scope })
    }

    fn scope(&self) -> &ModuleScope {
        &self.scope
    }

    fn build(&self, config: SeedConfig) -> ModuleResult<SeedExports> {
        let seed = match config.seed_override.filter(|seed| !seed.is_empty()) {
            Some(seed) => Deferred::known(seed),
            None => {
                let random_id = self.scope.register(
                    "random:index/randomId:RandomId",
                    "seed",
                    json!({ "byteLength": config.byte_length.unwrap_or(DEFAULT_BYTE_LENGTH) }),
                    ResourceOptions::new(),
                )?;
                random_id
                    .output_str("b64Url")
                    .map(|value| value.to_lowercase().replace('_', "").replace('-', ""))
            }
        };

        Ok(SeedExports { seed })
    }
}
