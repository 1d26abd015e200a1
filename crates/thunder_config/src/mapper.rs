//! Mapping of raw stack configuration onto typed module configuration.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thunder_core::ConfigStore;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{validate, ModuleConfig, Schema};

/// Stack configuration with the stack prefix removed from its keys.
pub type RawConfig = BTreeMap<String, Value>;

/// Every `"{stack}:{key}"` entry of `store`, keyed by `key`.
///
/// Values are decoded as JSON when they parse as JSON and kept as strings
/// otherwise. This is lossy: a string that happens to be valid JSON, such as
/// `"123"` or `"true"`, comes back as a number or a bool.
pub fn get_raw_stack_config(store: &dyn ConfigStore, stack: &str) -> RawConfig {
    let prefix = format!("{}:", stack);

    let config: RawConfig = store
        .entries()
        .into_iter()
        .filter_map(|(key, value)| {
            let key = key.strip_prefix(&prefix)?.to_string();
            Some((key, parse_value(value)))
        })
        .collect();

    debug!("config dict for stack `{}` is {:?}", stack, config);
    config
}

fn parse_value(value: String) -> Value {
    serde_json::from_str(&value).unwrap_or(Value::String(value))
}

/// Typed configuration of `stack`.
pub fn get_stack_config<T: ModuleConfig>(store: &dyn ConfigStore, stack: &str) -> ConfigResult<T> {
    let config = convert(stack, get_raw_stack_config(store, stack))?;
    debug!("config for stack `{}` is {:?}", stack, config);
    Ok(config)
}

/// Validate `raw` against `T::schema()` and deserialize it.
pub fn convert<T: ModuleConfig>(stack: &str, raw: RawConfig) -> ConfigResult<T> {
    let normalized = normalize(&T::schema(), raw)?;
    serde_json::from_value(normalized).map_err(|e| ConfigError::Deserialize {
        stack: stack.to_string(),
        message: e.to_string(),
    })
}

/// Validate `raw` against `schema`, returning the normalized document.
pub fn normalize(schema: &Schema, raw: RawConfig) -> ConfigResult<Value> {
    let document = Value::Object(raw.into_iter().collect::<Map<_, _>>());
    validate(&document, schema, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Record;
    use serde::Deserialize;
    use serde_json::json;
    use thunder_core::LocalConfigStore;

    #[derive(Debug, Deserialize, PartialEq)]
    struct QueueArgs {
        name: String,
        #[serde(default)]
        fifo: bool,
    }

    impl ModuleConfig for QueueArgs {
        fn schema() -> Schema {
            Record::new("QueueArgs")
                .required("name", Schema::String)
                .with_default("fifo", Schema::Bool)
                .into()
        }
    }

    #[test]
    fn test_raw_config_strips_prefix_and_decodes() {
        let store = LocalConfigStore::new()
            .with("sqs:name", "jobs")
            .with("sqs:fifo", "true")
            .with("sqs:queues", r#"[{"name":"a"}]"#)
            .with("aws:region", "us-west-2");

        let raw = get_raw_stack_config(&store, "sqs");
        assert_eq!(raw.len(), 3);
        assert_eq!(raw["name"], json!("jobs"));
        assert_eq!(raw["fifo"], json!(true));
        assert_eq!(raw["queues"], json!([{"name": "a"}]));
    }

    #[test]
    fn test_json_lookalike_strings_are_reinterpreted() {
        let store = LocalConfigStore::new().with("sqs:name", "123");
        assert_eq!(get_raw_stack_config(&store, "sqs")["name"], json!(123));

        let err = get_stack_config::<QueueArgs>(&store, "sqs").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidType { .. }));
    }

    #[test]
    fn test_typed_config_with_default() {
        let store = LocalConfigStore::new().with("sqs:name", "jobs");
        let args: QueueArgs = get_stack_config(&store, "sqs").unwrap();
        assert_eq!(
            args,
            QueueArgs {
                name: "jobs".into(),
                fifo: false
            }
        );
    }

    #[test]
    fn test_other_stacks_do_not_leak() {
        let store = LocalConfigStore::new()
            .with("sqs:name", "jobs")
            .with("sqs-dlq:name", "dead");
        let raw = get_raw_stack_config(&store, "sqs");
        assert_eq!(raw.len(), 1);
    }
}
