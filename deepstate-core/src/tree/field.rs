//! What a read hands back.

use std::fmt;

use crate::error::Result;
use crate::reactive::{Memo, Signal};
use crate::value::{Derive, Json, Shallow};

use super::Node;

/// The result of reading a key.
///
/// Normal reads produce `Value`, `Node` or `Shallow`. Escape-hatch reads
/// produce `Signal` for leaves and `Computed` for computed keys.
#[derive(Clone, Debug)]
pub enum Field {
    Value(Json),
    Node(Node),
    Shallow(Shallow),
    Signal(Signal<Json>),
    Computed(Computed),
}

impl Field {
    pub fn as_value(&self) -> Option<&Json> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Field::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_shallow(&self) -> Option<&Shallow> {
        match self {
            Field::Shallow(raw) => Some(raw),
            _ => None,
        }
    }

    pub fn as_signal(&self) -> Option<&Signal<Json>> {
        match self {
            Field::Signal(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_computed(&self) -> Option<&Computed> {
        match self {
            Field::Computed(computed) => Some(computed),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Json::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Json::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Json::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Json::as_str)
    }

    /// Plain JSON for whatever the field holds. Signals and computeds are
    /// read, so the call is tracked like any other read.
    pub fn to_json(&self) -> Result<Json> {
        Ok(match self {
            Field::Value(v) => v.clone(),
            Field::Node(node) => node.to_json(),
            Field::Shallow(raw) => raw.to_json(),
            Field::Signal(cell) => cell.get(),
            Field::Computed(computed) => computed.get()?,
        })
    }
}

/// Handle to a computed key obtained through the escape hatch.
///
/// In SPA trees it wraps the key's memo; in SSR trees every `get` runs the
/// declaration again.
#[derive(Clone)]
pub struct Computed {
    kind: ComputedKind,
}

#[derive(Clone)]
enum ComputedKind {
    Cached(Memo<Json>),
    Fresh { node: Node, key: String, decl: Derive },
}

impl Computed {
    pub(crate) fn cached(memo: Memo<Json>) -> Self {
        Self {
            kind: ComputedKind::Cached(memo),
        }
    }

    pub(crate) fn fresh(node: Node, key: &str, decl: Derive) -> Self {
        Self {
            kind: ComputedKind::Fresh {
                node,
                key: key.to_string(),
                decl,
            },
        }
    }

    /// Current value.
    pub fn get(&self) -> Result<Json> {
        match &self.kind {
            ComputedKind::Cached(memo) => memo.get(),
            ComputedKind::Fresh { node, key, decl } => node.evaluate_fresh(key, decl),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.kind, ComputedKind::Cached(_))
    }

    /// The backing memo, for SPA trees.
    pub fn memo(&self) -> Option<&Memo<Json>> {
        match &self.kind {
            ComputedKind::Cached(memo) => Some(memo),
            ComputedKind::Fresh { .. } => None,
        }
    }

    /// How often the memo has run; `None` for uncached computeds.
    pub fn compute_count(&self) -> Option<u64> {
        self.memo().map(Memo::compute_count)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ComputedKind::Cached(memo) => f.debug_tuple("Computed").field(memo).finish(),
            ComputedKind::Fresh { key, .. } => {
                f.debug_struct("Computed").field("fresh", key).finish()
            }
        }
    }
}
