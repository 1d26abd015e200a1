//! Export trees and the output flattener.
//!
//! A module's build returns any `Serialize` exports object. [`flatten`] walks
//! it with a dedicated serializer and produces an [`ExportTree`]: maps, lists
//! and scalars, where scalar leaves may still be [`Deferred`] values. Records
//! become maps, enum variants follow serde's externally tagged layout.
//!
//! Anything the engine could not persist or another stack could not query is
//! rejected on sight: byte buffers, opaque engine handles such as
//! [`Resource`](crate::engine::Resource), and maps keyed by non-scalar values.

use std::cell::RefCell;
use std::collections::BTreeMap;

use serde::ser::{
    Impossible, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant,
    SerializeTuple, SerializeTupleStruct, SerializeTupleVariant,
};
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};

use crate::deferred::Deferred;
use crate::error::{ExportError, ExportResult};

pub(crate) const DEFERRED_TOKEN: &str = "$thunder::private::Deferred";
pub(crate) const OPAQUE_TOKEN: &str = "$thunder::private::Opaque";

thread_local! {
    static CAPTURED: RefCell<Option<Vec<Deferred<Value>>>> = RefCell::new(None);
}

/// Hand a deferred value to the flattener running on this thread, if any.
pub(crate) fn capture(value: Deferred<Value>) -> Option<u64> {
    CAPTURED.with(|captured| {
        captured.borrow_mut().as_mut().map(|values| {
            values.push(value);
            (values.len() - 1) as u64
        })
    })
}

fn captured(id: u64) -> Option<Deferred<Value>> {
    CAPTURED.with(|captured| {
        captured
            .borrow()
            .as_ref()
            .and_then(|values| values.get(id as usize).cloned())
    })
}

struct CaptureScope {
    previous: Option<Vec<Deferred<Value>>>,
}

impl CaptureScope {
    fn begin() -> Self {
        let previous = CAPTURED.with(|captured| captured.replace(Some(Vec::new())));
        Self { previous }
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CAPTURED.with(|captured| *captured.borrow_mut() = previous);
    }
}

/// Serialize an engine handle that must never end up in an export tree.
///
/// Outside the flattener the handle serializes as its description.
pub fn serialize_opaque<S: Serializer>(description: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_newtype_struct(OPAQUE_TOKEN, description)
}

/// The serializable output of a module run.
#[derive(Debug, Clone)]
pub enum ExportTree {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<ExportTree>),
    Map(BTreeMap<String, ExportTree>),
    Deferred(Deferred<Value>),
}

impl Default for ExportTree {
    fn default() -> Self {
        ExportTree::Null
    }
}

impl ExportTree {
    /// The plain JSON value, once every deferred leaf has resolved.
    pub fn resolved(&self) -> Option<Value> {
        match self {
            ExportTree::Null => Some(Value::Null),
            ExportTree::Bool(b) => Some(Value::Bool(*b)),
            ExportTree::Number(n) => Some(Value::Number(n.clone())),
            ExportTree::String(s) => Some(Value::String(s.clone())),
            ExportTree::List(items) => items
                .iter()
                .map(ExportTree::resolved)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            ExportTree::Map(entries) => entries
                .iter()
                .map(|(k, v)| v.resolved().map(|v| (k.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(Value::Object),
            ExportTree::Deferred(value) => value.peek(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.deferred_leaves()
            .iter()
            .all(|leaf| leaf.is_resolved())
    }

    /// All deferred leaves, depth first.
    pub fn deferred_leaves(&self) -> Vec<Deferred<Value>> {
        let mut leaves = Vec::new();
        self.collect_deferred(&mut leaves);
        leaves
    }

    fn collect_deferred(&self, leaves: &mut Vec<Deferred<Value>>) {
        match self {
            ExportTree::List(items) => items.iter().for_each(|i| i.collect_deferred(leaves)),
            ExportTree::Map(entries) => entries.values().for_each(|v| v.collect_deferred(leaves)),
            ExportTree::Deferred(value) => leaves.push(value.clone()),
            _ => {}
        }
    }

    /// A single deferred value for the whole tree.
    pub fn to_deferred(&self) -> Deferred<Value> {
        let leaves = self.deferred_leaves();
        if leaves.is_empty() {
            return Deferred::known(self.resolved().unwrap_or(Value::Null));
        }
        let tree = self.clone();
        Deferred::all(leaves).map(move |_| tree.resolved().unwrap_or(Value::Null))
    }

    pub fn get(&self, key: &str) -> Option<&ExportTree> {
        match self {
            ExportTree::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&Deferred<Value>> {
        match self {
            ExportTree::Deferred(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExportTree::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Value> for ExportTree {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ExportTree::Null,
            Value::Bool(b) => ExportTree::Bool(b),
            Value::Number(n) => ExportTree::Number(n),
            Value::String(s) => ExportTree::String(s),
            Value::Array(items) => ExportTree::List(items.into_iter().map(Into::into).collect()),
            Value::Object(entries) => {
                ExportTree::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl Serialize for ExportTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExportTree::Null => serializer.serialize_unit(),
            ExportTree::Bool(b) => serializer.serialize_bool(*b),
            ExportTree::Number(n) => n.serialize(serializer),
            ExportTree::String(s) => serializer.serialize_str(s),
            ExportTree::List(items) => items.serialize(serializer),
            ExportTree::Map(entries) => entries.serialize(serializer),
            ExportTree::Deferred(value) => value.serialize(serializer),
        }
    }
}

/// Convert a module's exports object into an export tree.
pub fn flatten<T: Serialize + ?Sized>(exports: &T) -> ExportResult<ExportTree> {
    let _scope = CaptureScope::begin();
    exports.serialize(TreeSerializer)
}

/// Flatten `exports` and key the result by the stack name.
pub fn outputs_from_exports<T: Serialize + ?Sized>(
    stack: &str,
    exports: &T,
) -> ExportResult<ExportTree> {
    let mut outputs = BTreeMap::new();
    outputs.insert(stack.to_string(), flatten(exports)?);
    Ok(ExportTree::Map(outputs))
}

fn unsupported(type_name: impl Into<String>) -> ExportError {
    ExportError::Unsupported {
        type_name: type_name.into(),
    }
}

struct TreeSerializer;

impl Serializer for TreeSerializer {
    type Ok = ExportTree;
    type Error = ExportError;

    type SerializeSeq = ListBuilder;
    type SerializeTuple = ListBuilder;
    type SerializeTupleStruct = ListBuilder;
    type SerializeTupleVariant = VariantListBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> ExportResult<ExportTree> {
        Ok(ExportTree::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> ExportResult<ExportTree> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> ExportResult<ExportTree> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> ExportResult<ExportTree> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> ExportResult<ExportTree> {
        Ok(ExportTree::Number(v.into()))
    }

    fn serialize_u8(self, v: u8) -> ExportResult<ExportTree> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u16(self, v: u16) -> ExportResult<ExportTree> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u32(self, v: u32) -> ExportResult<ExportTree> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u64(self, v: u64) -> ExportResult<ExportTree> {
        Ok(ExportTree::Number(v.into()))
    }

    fn serialize_f32(self, v: f32) -> ExportResult<ExportTree> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> ExportResult<ExportTree> {
        Number::from_f64(v)
            .map(ExportTree::Number)
            .ok_or_else(|| ExportError::Unsupported {
                type_name: format!("non-finite float {}", v),
            })
    }

    fn serialize_char(self, v: char) -> ExportResult<ExportTree> {
        Ok(ExportTree::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> ExportResult<ExportTree> {
        Ok(ExportTree::String(v.to_string()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> ExportResult<ExportTree> {
        Err(unsupported("bytes"))
    }

    fn serialize_none(self) -> ExportResult<ExportTree> {
        Ok(ExportTree::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> ExportResult<ExportTree> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> ExportResult<ExportTree> {
        Ok(ExportTree::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> ExportResult<ExportTree> {
        Ok(ExportTree::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> ExportResult<ExportTree> {
        Ok(ExportTree::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> ExportResult<ExportTree> {
        match name {
            DEFERRED_TOKEN => {
                let id = match value.serialize(TreeSerializer)? {
                    ExportTree::Number(n) => n.as_u64(),
                    _ => None,
                };
                id.and_then(captured)
                    .map(ExportTree::Deferred)
                    .ok_or_else(|| ExportError::Custom("lost track of a deferred value".into()))
            }
            OPAQUE_TOKEN => match value.serialize(TreeSerializer)? {
                ExportTree::String(description) => Err(unsupported(description)),
                _ => Err(unsupported("opaque handle")),
            },
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> ExportResult<ExportTree> {
        let mut entries = BTreeMap::new();
        entries.insert(variant.to_string(), value.serialize(TreeSerializer)?);
        Ok(ExportTree::Map(entries))
    }

    fn serialize_seq(self, len: Option<usize>) -> ExportResult<ListBuilder> {
        Ok(ListBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> ExportResult<ListBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> ExportResult<ListBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> ExportResult<VariantListBuilder> {
        Ok(VariantListBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> ExportResult<MapBuilder> {
        Ok(MapBuilder::default())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> ExportResult<MapBuilder> {
        Ok(MapBuilder::default())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> ExportResult<VariantMapBuilder> {
        Ok(VariantMapBuilder {
            variant,
            entries: BTreeMap::new(),
        })
    }
}

struct ListBuilder {
    items: Vec<ExportTree>,
}

impl SerializeSeq for ListBuilder {
    type Ok = ExportTree;
    type Error = ExportError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> ExportResult<()> {
        self.items.push(value.serialize(TreeSerializer)?);
        Ok(())
    }

    fn end(self) -> ExportResult<ExportTree> {
        Ok(ExportTree::List(self.items))
    }
}

impl SerializeTuple for ListBuilder {
    type Ok = ExportTree;
    type Error = ExportError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> ExportResult<()> {
        SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> ExportResult<ExportTree> {
        SerializeSeq::end(self)
    }
}

impl SerializeTupleStruct for ListBuilder {
    type Ok = ExportTree;
    type Error = ExportError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> ExportResult<()> {
        SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> ExportResult<ExportTree> {
        SerializeSeq::end(self)
    }
}

struct VariantListBuilder {
    variant: &'static str,
    items: Vec<ExportTree>,
}

impl SerializeTupleVariant for VariantListBuilder {
    type Ok = ExportTree;
    type Error = ExportError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> ExportResult<()> {
        self.items.push(value.serialize(TreeSerializer)?);
        Ok(())
    }

    fn end(self) -> ExportResult<ExportTree> {
        let mut entries = BTreeMap::new();
        entries.insert(self.variant.to_string(), ExportTree::List(self.items));
        Ok(ExportTree::Map(entries))
    }
}

#[derive(Default)]
struct MapBuilder {
    entries: BTreeMap<String, ExportTree>,
    next_key: Option<String>,
}

impl SerializeMap for MapBuilder {
    type Ok = ExportTree;
    type Error = ExportError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> ExportResult<()> {
        self.next_key = Some(key.serialize(MapKeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> ExportResult<()> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| ExportError::Custom("map value without a key".into()))?;
        self.entries.insert(key, value.serialize(TreeSerializer)?);
        Ok(())
    }

    fn end(self) -> ExportResult<ExportTree> {
        Ok(ExportTree::Map(self.entries))
    }
}

impl SerializeStruct for MapBuilder {
    type Ok = ExportTree;
    type Error = ExportError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> ExportResult<()> {
        self.entries
            .insert(key.to_string(), value.serialize(TreeSerializer)?);
        Ok(())
    }

    fn end(self) -> ExportResult<ExportTree> {
        Ok(ExportTree::Map(self.entries))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    entries: BTreeMap<String, ExportTree>,
}

impl SerializeStructVariant for VariantMapBuilder {
    type Ok = ExportTree;
    type Error = ExportError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> ExportResult<()> {
        self.entries
            .insert(key.to_string(), value.serialize(TreeSerializer)?);
        Ok(())
    }

    fn end(self) -> ExportResult<ExportTree> {
        let mut outer = BTreeMap::new();
        outer.insert(self.variant.to_string(), ExportTree::Map(self.entries));
        Ok(ExportTree::Map(outer))
    }
}

/// Map keys must be scalars; they are exported as strings.
struct MapKeySerializer;

fn key_error(type_name: &str) -> ExportError {
    unsupported(format!("map key of type {}", type_name))
}

impl Serializer for MapKeySerializer {
    type Ok = String;
    type Error = ExportError;

    type SerializeSeq = Impossible<String, ExportError>;
    type SerializeTuple = Impossible<String, ExportError>;
    type SerializeTupleStruct = Impossible<String, ExportError>;
    type SerializeTupleVariant = Impossible<String, ExportError>;
    type SerializeMap = Impossible<String, ExportError>;
    type SerializeStruct = Impossible<String, ExportError>;
    type SerializeStructVariant = Impossible<String, ExportError>;

    fn serialize_bool(self, v: bool) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> ExportResult<String> {
        Err(key_error("f32"))
    }

    fn serialize_f64(self, _v: f64) -> ExportResult<String> {
        Err(key_error("f64"))
    }

    fn serialize_char(self, v: char) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> ExportResult<String> {
        Ok(v.to_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> ExportResult<String> {
        Err(key_error("bytes"))
    }

    fn serialize_none(self) -> ExportResult<String> {
        Err(key_error("none"))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _value: &T) -> ExportResult<String> {
        Err(key_error("option"))
    }

    fn serialize_unit(self) -> ExportResult<String> {
        Err(key_error("unit"))
    }

    fn serialize_unit_struct(self, name: &'static str) -> ExportResult<String> {
        Err(key_error(name))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> ExportResult<String> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> ExportResult<String> {
        match name {
            DEFERRED_TOKEN => Err(key_error("deferred value")),
            OPAQUE_TOKEN => Err(key_error("opaque handle")),
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> ExportResult<String> {
        Err(key_error(name))
    }

    fn serialize_seq(self, _len: Option<usize>) -> ExportResult<Self::SerializeSeq> {
        Err(key_error("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> ExportResult<Self::SerializeTuple> {
        Err(key_error("tuple"))
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> ExportResult<Self::SerializeTupleStruct> {
        Err(key_error(name))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> ExportResult<Self::SerializeTupleVariant> {
        Err(key_error(name))
    }

    fn serialize_map(self, _len: Option<usize>) -> ExportResult<Self::SerializeMap> {
        Err(key_error("map"))
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> ExportResult<Self::SerializeStruct> {
        Err(key_error(name))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> ExportResult<Self::SerializeStructVariant> {
        Err(key_error(name))
    }
}
