//! Structural description of module configuration types.
//!
//! Each configuration type registers a [`Schema`] alongside its serde
//! implementation. Raw stack configuration is validated against the schema
//! before deserialization so that unknown keys, missing fields and bad enum
//! values are reported with the full path of the offending field.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// A typed module configuration.
pub trait ModuleConfig: DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Structural description of `Self`.
    fn schema() -> Schema;
}

/// Structural type of a configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// Accept anything, unchecked.
    Any,
    String,
    Bool,
    Integer,
    Float,
    Enum(EnumSchema),
    List(Box<Schema>),
    /// String keys, homogeneous values.
    Map(Box<Schema>),
    /// The value may be null.
    Optional(Box<Schema>),
    Record(Record),
}

impl Schema {
    pub fn list(item: impl Into<Schema>) -> Self {
        Schema::List(Box::new(item.into()))
    }

    pub fn map(value: impl Into<Schema>) -> Self {
        Schema::Map(Box::new(value.into()))
    }

    pub fn optional(inner: impl Into<Schema>) -> Self {
        Schema::Optional(Box::new(inner.into()))
    }

    /// Schema of a nested configuration type.
    pub fn of<T: ModuleConfig>() -> Self {
        T::schema()
    }

    /// Short human readable name.
    pub fn type_name(&self) -> String {
        match self {
            Schema::Any => "any".to_string(),
            Schema::String => "string".to_string(),
            Schema::Bool => "bool".to_string(),
            Schema::Integer => "integer".to_string(),
            Schema::Float => "float".to_string(),
            Schema::Enum(e) => e.name.clone(),
            Schema::List(item) => format!("list[{}]", item.type_name()),
            Schema::Map(value) => format!("map[string, {}]", value.type_name()),
            Schema::Optional(inner) => format!("optional[{}]", inner.type_name()),
            Schema::Record(record) => record.name.clone(),
        }
    }
}

/// One accepted representation of an enum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    /// Name serde expects.
    pub name: String,
    /// Alternative representation, e.g. `"gp3"` or `2`.
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

impl EnumSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    /// A variant accepted only by name.
    pub fn variant(mut self, name: impl Into<String>) -> Self {
        self.variants.push(EnumVariant {
            name: name.into(),
            value: None,
        });
        self
    }

    /// A variant also accepted by `value`.
    pub fn variant_with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variants.push(EnumVariant {
            name: name.into(),
            value: Some(value.into()),
        });
        self
    }

    fn coerce(&self, value: &Value) -> Option<&EnumVariant> {
        self.variants.iter().find(|variant| {
            let by_name = value.as_str() == Some(variant.name.as_str());
            let by_value = match (&variant.value, value) {
                (Some(expected), found) if expected == found => true,
                // Integer values arrive as text when written as strings.
                (Some(Value::Number(n)), Value::String(s)) => s.trim() == n.to_string(),
                (Some(Value::String(s)), Value::Number(n)) => *s == n.to_string(),
                _ => false,
            };
            by_name || by_value
        })
    }

    fn expected(&self) -> String {
        self.variants
            .iter()
            .map(|v| match &v.value {
                Some(value) => format!("{} ({})", v.name, value),
                None => v.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<EnumSchema> for Schema {
    fn from(value: EnumSchema) -> Self {
        Schema::Enum(value)
    }
}

/// How a record field behaves when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    /// Filled from the type's serde default.
    Default,
    /// Absent means none.
    Optional,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub presence: Presence,
}

/// A struct-like configuration type.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn required(self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.field(name, schema, Presence::Required)
    }

    pub fn with_default(self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.field(name, schema, Presence::Default)
    }

    pub fn optional(self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.field(name, schema, Presence::Optional)
    }

    fn field(mut self, name: impl Into<String>, schema: impl Into<Schema>, presence: Presence) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema: schema.into(),
            presence,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl From<Record> for Schema {
    fn from(value: Record) -> Self {
        Schema::Record(value)
    }
}

/// Check `value` against `schema` and return its normalized form.
///
/// Enum values are rewritten to their variant name and null default fields
/// are dropped, so the result deserializes with serde. `path` prefixes error
/// locations; pass `""` at the root.
pub fn validate(value: &Value, schema: &Schema, path: &str) -> ConfigResult<Value> {
    match (schema, value) {
        (Schema::Any, value) => Ok(value.clone()),
        (Schema::Optional(_), Value::Null) => Ok(Value::Null),
        (Schema::Optional(inner), value) => validate(value, inner, path),
        (Schema::String, Value::String(_)) | (Schema::Bool, Value::Bool(_)) => Ok(value.clone()),
        (Schema::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        (Schema::Float, Value::Number(_)) => Ok(value.clone()),
        (Schema::Enum(e), value) => match e.coerce(value) {
            Some(variant) => Ok(Value::String(variant.name.clone())),
            None => Err(ConfigError::InvalidEnum {
                path: display_path(path),
                value: value.to_string(),
                expected: e.expected(),
            }),
        },
        (Schema::List(item), Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, v)| validate(v, item, &format!("{}[{}]", path, i)))
            .collect::<ConfigResult<Vec<_>>>()
            .map(Value::Array),
        (Schema::Map(inner), Value::Object(entries)) => entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), validate(v, inner, &join(path, k))?)))
            .collect::<ConfigResult<Map<_, _>>>()
            .map(Value::Object),
        (Schema::Record(record), Value::Object(entries)) => validate_record(record, entries, path),
        (schema, value) => Err(ConfigError::InvalidType {
            path: display_path(path),
            expected: schema.type_name(),
            found: json_type_name(value).to_string(),
        }),
    }
}

fn validate_record(record: &Record, entries: &Map<String, Value>, path: &str) -> ConfigResult<Value> {
    if let Some(unknown) = entries.keys().find(|k| record.get(k).is_none()) {
        return Err(ConfigError::UnknownField {
            path: join(path, unknown),
        });
    }

    let mut normalized = Map::new();
    for field in &record.fields {
        let field_path = join(path, &field.name);
        match (entries.get(&field.name), field.presence) {
            (None, Presence::Required) | (Some(Value::Null), Presence::Required)
                if !matches!(field.schema, Schema::Optional(_) | Schema::Any) =>
            {
                return Err(ConfigError::MissingField { path: field_path });
            }
            (None, _) | (Some(Value::Null), Presence::Default) => {}
            (Some(Value::Null), Presence::Optional) => {
                normalized.insert(field.name.clone(), Value::Null);
            }
            (Some(value), _) => {
                normalized.insert(field.name.clone(), validate(value, &field.schema, &field_path)?);
            }
        }
    }
    Ok(Value::Object(normalized))
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
