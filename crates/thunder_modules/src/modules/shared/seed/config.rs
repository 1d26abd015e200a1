use serde::{Deserialize, Serialize};
use thunder_config::{ModuleConfig, Record, Schema};
use thunder_core::Deferred;

pub(crate) const DEFAULT_BYTE_LENGTH: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedConfig {
    /// Use this seed instead of generating one.
    #[serde(default)]
    pub seed_override: Option<String>,

    /// Number of random bytes to produce. The bytes are then base64 encoded.
    #[serde(default = "default_byte_length")]
    pub byte_length: Option<u32>,
}

fn default_byte_length() -> Option<u32> {
    Some(DEFAULT_BYTE_LENGTH)
}

impl ModuleConfig for SeedConfig {
    fn schema() -> Schema {
        Record::new("SeedConfig")
            .optional("seed_override", Schema::String)
            .with_default("byte_length", Schema::optional(Schema::Integer))
            .into()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedExports {
    pub seed: Deferred<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use thunder_config::{convert, get_stack_config, RawConfig};
    use thunder_core::LocalConfigStore;

    #[test]
    fn test_defaults() {
        let config: SeedConfig = convert("seed", RawConfig::new()).unwrap();
        assert_eq!(config.seed_override, None);
        assert_eq!(config.byte_length, Some(DEFAULT_BYTE_LENGTH));
    }

    #[test]
    fn test_null_override_from_stack_file() {
        let store = LocalConfigStore::from_yaml_str(
            "config:\n  seed:seed_override: null\n  seed:byte_length: null\n",
        )
        .unwrap();
        let config: SeedConfig = get_stack_config(&store, "seed").unwrap();
        assert_eq!(config.seed_override, None);
        assert_eq!(config.byte_length, Some(DEFAULT_BYTE_LENGTH));
    }

    #[test]
    fn test_override_and_length() {
        let raw = RawConfig::from([
            ("seed_override".to_string(), json!("abc123")),
            ("byte_length".to_string(), json!(12)),
        ]);
        let config: SeedConfig = convert("seed", raw).unwrap();
        assert_eq!(config.seed_override.as_deref(), Some("abc123"));
        assert_eq!(config.byte_length, Some(12));
    }
}
