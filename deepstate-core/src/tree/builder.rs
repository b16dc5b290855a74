//! Turning plain values into nodes.
//!
//! Each value is classified in a fixed order: computed declaration, existing
//! signal, shallow handle, nested object or array, primitive. Computeds are
//! recorded but not evaluated, so building never runs user code.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{ReifyError, Result};
use crate::options::Options;
use crate::reactive::Signal;
use crate::value::Value;

use super::{Children, ComputedSlot, Node, Slot, Tree};

/// Counts gathered while building, for the debug log.
#[derive(Debug, Default)]
pub(crate) struct BuildStats {
    pub nodes: usize,
    pub signals: usize,
    pub computeds: usize,
    pub shallow: usize,
}

/// Build a whole tree. The root must be an object.
pub(crate) fn build_root(value: Value, options: Options) -> Result<Node> {
    let entries = match value {
        Value::Object(entries) => entries,
        other => {
            return Err(ReifyError::InvalidRootShape {
                found: other.kind_name(),
            })
        }
    };

    let tree = Tree::new(options);
    let mut stats = BuildStats::default();
    let root = build_object(&tree, entries, &mut stats);
    tree.set_root(&root);

    debug!(
        nodes = stats.nodes,
        signals = stats.signals,
        computeds = stats.computeds,
        shallow = stats.shallow,
        mode = %tree.options.mode,
        permissive = tree.options.permissive,
        "built reactive tree"
    );
    Ok(root)
}

pub(crate) fn build_slot(tree: &Arc<Tree>, value: Value, stats: &mut BuildStats) -> Slot {
    match value {
        Value::Computed(decl) => {
            stats.computeds += 1;
            Slot::Computed(ComputedSlot::new(decl))
        }
        Value::Signal(cell) => {
            stats.signals += 1;
            Slot::Signal(cell)
        }
        Value::Shallow(raw) => {
            stats.shallow += 1;
            Slot::Shallow(Signal::new(raw))
        }
        Value::Object(entries) => Slot::Node(build_object(tree, entries, stats)),
        Value::Array(items) => Slot::Node(build_array(tree, items, stats)),
        primitive => {
            stats.signals += 1;
            Slot::Signal(Signal::new(primitive.to_json()))
        }
    }
}

fn build_object(
    tree: &Arc<Tree>,
    entries: IndexMap<String, Value>,
    stats: &mut BuildStats,
) -> Node {
    stats.nodes += 1;
    let children = entries
        .into_iter()
        .map(|(key, value)| (key, Some(build_slot(tree, value, stats))))
        .collect();
    Node::new(tree, Children::Object(children))
}

fn build_array(tree: &Arc<Tree>, items: Vec<Value>, stats: &mut BuildStats) -> Node {
    stats.nodes += 1;
    let children = items
        .into_iter()
        .map(|value| Some(build_slot(tree, value, stats)))
        .collect();
    Node::new(tree, Children::Array(children))
}

impl Node {
    /// Build a slot for a value written after construction.
    pub(crate) fn build_child(&self, value: Value) -> Slot {
        build_slot(&self.inner.tree, value, &mut BuildStats::default())
    }
}
