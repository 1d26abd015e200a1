//! Deferred values.
//!
//! A [`Deferred`] is a handle to a value the orchestration engine will know
//! once it has resolved the referenced resource. The core never waits for one:
//! it only composes them with pure functions ([`Deferred::map`],
//! [`Deferred::apply`], [`Deferred::all`]) and peeks at them without blocking.
//!
//! Two kinds of deferred values exist:
//!
//! - **slots**, created with [`Deferred::pending`] and filled exactly once by the
//!   engine through [`Deferred::resolve`];
//! - **derived** values, produced by the combinators. Their function runs the
//!   first time every input is available and the result is cached.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::error::{CoreError, CoreResult, ExportError, ExportResult};
use crate::export;

type Derive<T> = Box<dyn Fn() -> Option<T> + Send + Sync>;

enum Source<T> {
    Slot,
    Derived(Derive<T>),
}

struct Node<T> {
    value: OnceCell<T>,
    source: Source<T>,
}

/// A value that becomes known later.
pub struct Deferred<T> {
    node: Arc<Node<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// An unresolved slot, to be filled by the engine.
    pub fn pending() -> Self {
        Self {
            node: Arc::new(Node {
                value: OnceCell::new(),
                source: Source::Slot,
            }),
        }
    }

    /// A value that is already known.
    pub fn known(value: T) -> Self {
        Self {
            node: Arc::new(Node {
                value: OnceCell::with_value(value),
                source: Source::Slot,
            }),
        }
    }

    /// A value produced by `poll` the first time it returns `Some`.
    ///
    /// `poll` runs on every [`Deferred::peek`] until then and must not block.
    pub fn from_poll(poll: impl Fn() -> Option<T> + Send + Sync + 'static) -> Self {
        Self {
            node: Arc::new(Node {
                value: OnceCell::new(),
                source: Source::Derived(Box::new(poll)),
            }),
        }
    }

    /// Fill a pending slot. Slots resolve once; derived values cannot be
    /// resolved directly.
    pub fn resolve(&self, value: T) -> CoreResult<()> {
        match self.node.source {
            Source::Slot => self
                .node
                .value
                .set(value)
                .map_err(|_| CoreError::AlreadyResolved),
            Source::Derived(_) => Err(CoreError::NotASlot),
        }
    }

    /// The value if it is known by now. Never blocks.
    pub fn peek(&self) -> Option<T> {
        if let Some(value) = self.node.value.get() {
            return Some(value.clone());
        }
        match &self.node.source {
            Source::Slot => None,
            Source::Derived(derive) => {
                let value = derive()?;
                Some(self.node.value.get_or_init(|| value).clone())
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.peek().is_some()
    }

    /// Whether both handles refer to the same underlying value.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.node, &b.node)
    }

    /// Transform the value once it is known.
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        Deferred::from_poll(move || source.peek().map(&f))
    }

    /// Chain a computation that itself produces a deferred value.
    pub fn apply<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Deferred<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let inner: OnceCell<Deferred<U>> = OnceCell::new();
        Deferred::from_poll(move || {
            let value = source.peek()?;
            inner.get_or_init(|| f(value)).peek()
        })
    }

    /// Combine N deferred values into one that is known once all inputs are.
    pub fn all(items: Vec<Deferred<T>>) -> Deferred<Vec<T>> {
        Deferred::from_poll(move || items.iter().map(Deferred::peek).collect())
    }

    /// Combine two deferred values of different types.
    pub fn zip<U>(&self, other: &Deferred<U>) -> Deferred<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let left = self.clone();
        let right = other.clone();
        Deferred::from_poll(move || Some((left.peek()?, right.peek()?)))
    }
}

impl<T> Deferred<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    /// Erase the value type to JSON.
    ///
    /// A known value that cannot be represented as JSON is an error. A value
    /// that resolves later and cannot be represented keeps the result pending,
    /// so it is never published.
    pub fn to_json(&self) -> ExportResult<Deferred<Value>> {
        if let Some(value) = self.peek() {
            return Ok(Deferred::known(json_value(value)?));
        }
        let source = self.clone();
        Ok(Deferred::from_poll(move || {
            json_value(source.peek()?)
                .map_err(|e| warn!("deferred value left unresolved: {}", e))
                .ok()
        }))
    }
}

fn json_value<T: Serialize>(value: T) -> ExportResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| ExportError::Custom(format!("value cannot be exported as JSON: {}", e)))
}

impl<T> From<T> for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Deferred::known(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node.value.get() {
            Some(value) => f.debug_tuple("Deferred").field(value).finish(),
            None => f.write_str("Deferred(<pending>)"),
        }
    }
}

/// Inside [`export::flatten`] a deferred value is kept as a leaf of the
/// export tree. Anywhere else it serializes as its value, which must be known.
impl<T> Serialize for Deferred<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let json = self.to_json().map_err(S::Error::custom)?;
        if let Some(id) = export::capture(json) {
            return serializer.serialize_newtype_struct(export::DEFERRED_TOKEN, &id);
        }
        match self.peek() {
            Some(value) => value.serialize(serializer),
            None => Err(S::Error::custom("deferred value has not resolved yet")),
        }
    }
}
