//! Plain input values.
//!
//! [`Value`] is what callers hand to `reify` and to `Node::set`: JSON-like
//! data that may also carry computed declarations, externally built signals
//! and shallow-marked subtrees.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};

use crate::error::{ReifyError, Result};
use crate::reactive::Signal;
use crate::tree::Node;

/// Plain JSON value, as produced by reads and serialization.
pub type Json = serde_json::Value;

/// A plain data tree, possibly decorated with reactive declarations.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    /// A derivation evaluated against the enclosing node.
    Computed(Derive),
    /// A signal built by the caller; stored as-is rather than re-wrapped.
    Signal(Signal<Json>),
    /// Raw data opted out of deep wrapping.
    Shallow(Shallow),
}

impl Value {
    /// Build an object from key/value pairs, keeping their order.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build an array from items.
    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// A computed that only looks at its own node.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Node) -> Result<Json> + Send + Sync + 'static,
    {
        Value::Computed(Derive::new(f))
    }

    /// A computed that also reads from the tree root.
    pub fn computed_with_root<F>(f: F) -> Self
    where
        F: Fn(&Node, &Node) -> Result<Json> + Send + Sync + 'static,
    {
        Value::Computed(Derive::with_root(f))
    }

    /// Human-readable kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Computed(_) => "computed",
            Value::Signal(_) => "signal",
            Value::Shallow(_) => "shallow value",
        }
    }

    /// The value as JSON when it is pure data.
    ///
    /// Returns `None` if a computed, signal or shallow handle appears anywhere
    /// inside.
    pub fn as_plain(&self) -> Option<Json> {
        Some(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(n.clone()),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(Value::as_plain)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Value::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| v.as_plain().map(|v| (k.clone(), v)))
                    .collect::<Option<serde_json::Map<_, _>>>()?,
            ),
            Value::Computed(_) | Value::Signal(_) | Value::Shallow(_) => return None,
        })
    }

    /// Current JSON rendering. Signals are read (and tracked), computeds are
    /// dropped from objects and rendered as `null` inside arrays.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(n.clone()),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => Json::Object(
                map.iter()
                    .filter(|(_, v)| !matches!(v, Value::Computed(_)))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Computed(_) => Json::Null,
            Value::Signal(cell) => cell.get(),
            Value::Shallow(raw) => raw.to_json(),
        }
    }

    fn child(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            Value::Array(items) => crate::tree::parse_index(key).and_then(|i| items.get(i)),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Object(map) => f.debug_map().entries(map).finish(),
            Value::Computed(decl) => decl.fmt(f),
            Value::Signal(cell) => cell.fmt(f),
            Value::Shallow(raw) => raw.fmt(f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_integer {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Value::Number(n.into())
            }
        })*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<Signal<Json>> for Value {
    fn from(cell: Signal<Json>) -> Self {
        Value::Signal(cell)
    }
}

impl From<Shallow> for Value {
    fn from(raw: Shallow) -> Self {
        Value::Shallow(raw)
    }
}

impl From<Derive> for Value {
    fn from(decl: Derive) -> Self {
        Value::Computed(decl)
    }
}

// ----------------------------------------------------------------------------
// Computed declarations
// ----------------------------------------------------------------------------

type LocalFn = dyn Fn(&Node) -> Result<Json> + Send + Sync;
type RootedFn = dyn Fn(&Node, &Node) -> Result<Json> + Send + Sync;

#[derive(Clone)]
enum DeriveFn {
    Local(Arc<LocalFn>),
    Rooted(Arc<RootedFn>),
}

/// A computed declaration: the user function that derives a key's value.
///
/// Its identity is the identity of the function it wraps; clones are the
/// same declaration.
#[derive(Clone)]
pub struct Derive {
    func: DeriveFn,
}

impl Derive {
    /// Declaration whose function only receives its own node.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Node) -> Result<Json> + Send + Sync + 'static,
    {
        Self {
            func: DeriveFn::Local(Arc::new(f)),
        }
    }

    /// Declaration whose function receives its own node and the tree root.
    pub fn with_root<F>(f: F) -> Self
    where
        F: Fn(&Node, &Node) -> Result<Json> + Send + Sync + 'static,
    {
        Self {
            func: DeriveFn::Rooted(Arc::new(f)),
        }
    }

    /// Whether the function takes the root parameter.
    pub fn needs_root(&self) -> bool {
        matches!(self.func, DeriveFn::Rooted(_))
    }

    /// Whether both declarations wrap the same function.
    pub fn same(&self, other: &Derive) -> bool {
        self.fn_ptr() == other.fn_ptr()
    }

    fn fn_ptr(&self) -> *const () {
        match &self.func {
            DeriveFn::Local(f) => Arc::as_ptr(f) as *const (),
            DeriveFn::Rooted(f) => Arc::as_ptr(f) as *const (),
        }
    }

    /// Run the function for `key` on `this`.
    ///
    /// A root-taking function fails with `RootUnavailable` when the tree has
    /// no reachable root; a local function never looks for one.
    pub(crate) fn evaluate(&self, key: &str, this: &Node) -> Result<Json> {
        match &self.func {
            DeriveFn::Local(f) => f(this),
            DeriveFn::Rooted(f) => {
                let root = this.root().ok_or_else(|| ReifyError::RootUnavailable {
                    key: key.to_string(),
                })?;
                f(this, &root)
            }
        }
    }
}

impl fmt::Debug for Derive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derive")
            .field("fn", &self.fn_ptr())
            .field("needs_root", &self.needs_root())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Shallow handles
// ----------------------------------------------------------------------------

/// Raw data stored by reference inside a tree.
///
/// Clones share the same storage, so the caller can keep the original handle
/// and mutate it outside the tree; reads through the tree observe the change.
/// Mutations through a `Shallow` do not notify anyone. Signals stored inside
/// remain reactive on their own.
#[derive(Clone)]
pub struct Shallow {
    inner: Arc<RwLock<Value>>,
}

/// Mark `value` as shallow and return the shared handle.
pub fn shallow(value: impl Into<Value>) -> Shallow {
    Shallow::new(value)
}

impl Shallow {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value.into())),
        }
    }

    /// Clone of the child at `key` (object key or array index).
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().child(key).cloned()
    }

    /// Current JSON of the child at `key`, or `null`.
    pub fn json(&self, key: &str) -> Json {
        self.inner
            .read()
            .child(key)
            .map(Value::to_json)
            .unwrap_or(Json::Null)
    }

    /// Write `key` in place. Returns `false` when the raw value is not a
    /// container or the index is past the end.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let mut raw = self.inner.write();
        match &mut *raw {
            Value::Object(map) => {
                map.insert(key.to_string(), value);
                true
            }
            Value::Array(items) => match crate::tree::parse_index(key) {
                Some(i) if i < items.len() => {
                    items[i] = value;
                    true
                }
                Some(i) if i == items.len() => {
                    items.push(value);
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Replace the whole raw value, returning the old one.
    pub fn replace(&self, value: impl Into<Value>) -> Value {
        std::mem::replace(&mut *self.inner.write(), value.into())
    }

    /// Borrow the raw value.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.inner.read())
    }

    /// Mutate the raw value in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn snapshot(&self) -> Value {
        self.inner.read().clone()
    }

    pub fn to_json(&self) -> Json {
        self.inner.read().to_json()
    }

    /// Whether both handles share storage.
    pub fn same(&self, other: &Shallow) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Shallow {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Shallow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shallow").field(&*self.inner.read()).finish()
    }
}
