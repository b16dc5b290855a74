//! Reactive Trees
//!
//! A tree mirrors a plain data value with reactive cells:
//!
//! - primitive leaves become [`Signal`]s,
//! - nested objects and arrays become child [`Node`]s,
//! - computed declarations become lazily materialized memos (SPA) or are
//!   re-evaluated on every read (SSR),
//! - shallow values are stored by reference behind a signal.
//!
//! Reads go through [`Node::get`] and report to the running reactive context,
//! so memos and effects see exactly the leaves they touched. Writes go through
//! the mutation guard in `guard.rs`.
//!
//! # Structure tracking
//!
//! Each node owns a `shape` signal bumped whenever keys or indices are added,
//! removed or moved. Key listings, lengths, array index reads and reads of
//! absent keys depend on it.
//!
//! # Ownership
//!
//! Parents own children through `Arc`s. Memos only hold a `Weak` to the node
//! they belong to, and the tree only holds a `Weak` to its root, so dropping
//! the last handle frees the whole tree.

mod builder;
mod escape;
mod field;
mod guard;
mod serialize;

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{ReifyError, Result};
use crate::options::{Mode, Options};
use crate::reactive::{Memo, Runtime, Signal};
use crate::value::{Derive, Json, Shallow};

pub(crate) use builder::build_root;
pub use field::{Computed, Field};

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Settings and root pointer shared by every node of one tree.
pub(crate) struct Tree {
    options: Options,
    root: OnceLock<Weak<NodeInner>>,
}

impl Tree {
    pub(crate) fn new(options: Options) -> Arc<Self> {
        Arc::new(Self {
            options,
            root: OnceLock::new(),
        })
    }

    fn root(&self) -> Option<Node> {
        self.root
            .get()
            .and_then(Weak::upgrade)
            .map(|inner| Node { inner })
    }

    /// Publish the root. Called once, after the whole tree is built.
    fn set_root(&self, node: &Node) {
        let _ = self.root.set(Arc::downgrade(&node.inner));
    }
}

/// Child storage of a node.
///
/// In objects a `None` entry is a declared key whose value was deleted; in
/// arrays it is a hole.
#[derive(Clone)]
pub(crate) enum Children {
    Object(IndexMap<String, Option<Slot>>),
    Array(Vec<Option<Slot>>),
}

impl Children {
    fn slot(&self, key: &str) -> Option<&Slot> {
        match self {
            Children::Object(map) => map.get(key).and_then(Option::as_ref),
            Children::Array(items) => parse_index(key)
                .and_then(|i| items.get(i))
                .and_then(Option::as_ref),
        }
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Slot> {
        match self {
            Children::Object(map) => map.get_mut(key).and_then(Option::as_mut),
            Children::Array(items) => parse_index(key)
                .and_then(|i| items.get_mut(i))
                .and_then(Option::as_mut),
        }
    }

    fn len(&self) -> usize {
        match self {
            Children::Object(map) => map.values().filter(|slot| slot.is_some()).count(),
            Children::Array(items) => items.len(),
        }
    }

    fn keys(&self) -> Vec<String> {
        match self {
            Children::Object(map) => map
                .iter()
                .filter(|(_, slot)| slot.is_some())
                .map(|(k, _)| k.clone())
                .collect(),
            Children::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_some())
                .map(|(i, _)| i.to_string())
                .collect(),
        }
    }
}

/// What a key holds.
#[derive(Clone)]
pub(crate) enum Slot {
    Signal(Signal<Json>),
    Computed(ComputedSlot),
    Node(Node),
    Shallow(Signal<Shallow>),
}

impl Slot {
    fn kind_name(&self) -> &'static str {
        match self {
            Slot::Signal(_) => "signal cell",
            Slot::Computed(_) => "computed",
            Slot::Node(node) if node.is_array() => "deep array",
            Slot::Node(_) => "deep object",
            Slot::Shallow(_) => "shallow value",
        }
    }

    /// Tell readers the slot is going away.
    fn retire(self) {
        match self {
            Slot::Signal(cell) => Runtime::notify_signal_change(cell.id()),
            Slot::Shallow(cell) => Runtime::notify_signal_change(cell.id()),
            Slot::Computed(slot) => {
                if let Some(instance) = slot.instance {
                    instance.memo.mark_dirty();
                }
            }
            Slot::Node(node) => node.retire_subtree(),
        }
    }
}

/// A computed key: the declaration plus its memo once materialized.
#[derive(Clone)]
pub(crate) struct ComputedSlot {
    decl: Derive,
    instance: Option<Instance>,
}

impl ComputedSlot {
    pub(crate) fn new(decl: Derive) -> Self {
        Self {
            decl,
            instance: None,
        }
    }
}

/// A materialized memo, tagged with the declaration it was built from.
#[derive(Clone)]
struct Instance {
    origin: Derive,
    memo: Memo<Json>,
}

/// A node of a reactive tree: an object or an array.
///
/// Cloning is cheap and yields another handle to the same node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

pub(crate) struct NodeInner {
    id: NodeId,
    tree: Arc<Tree>,
    shape: Signal<u64>,
    children: RwLock<Children>,
}

impl Node {
    pub(crate) fn new(tree: &Arc<Tree>, children: Children) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: NodeId::next(),
                tree: Arc::clone(tree),
                shape: Signal::new(0),
                children: RwLock::new(children),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.inner.children.read(), Children::Array(_))
    }

    pub fn options(&self) -> &Options {
        &self.inner.tree.options
    }

    pub fn mode(&self) -> Mode {
        self.inner.tree.options.mode
    }

    /// The root of the tree this node belongs to, if it is still alive.
    pub fn root(&self) -> Option<Node> {
        self.inner.tree.root()
    }

    pub fn is_root(&self) -> bool {
        self.root().is_some_and(|root| root.same(self))
    }

    /// Whether both handles point at the same node.
    pub fn same(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read `key`.
    ///
    /// Leaves come back as plain values, nested collections as child nodes,
    /// shallow slots as their raw handle and computeds as their current
    /// value. Keys starting with the escape-hatch prefix resolve to the
    /// underlying signal or computed instead. Absent keys yield `None`.
    pub fn get(&self, key: &str) -> Result<Option<Field>> {
        if let Some(target) = self.options().escaped(key) {
            return Ok(self.resolve_escape(target));
        }
        if key == "length" && self.is_array() {
            self.track_shape();
            return Ok(Some(Field::Value(Json::from(self.inner.children.read().len()))));
        }
        match self.lookup(key) {
            Some(slot) => self.read_slot(key, slot).map(Some),
            None => Ok(None),
        }
    }

    /// Read `key` as plain JSON; absent keys are `null`.
    pub fn json(&self, key: &str) -> Result<Json> {
        match self.get(key)? {
            Some(field) => field.to_json(),
            None => Ok(Json::Null),
        }
    }

    /// The child node at `key`, if `key` holds a nested collection.
    pub fn child(&self, key: &str) -> Option<Node> {
        match self.lookup(key)? {
            Slot::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Read the array element at `index`.
    pub fn at(&self, index: usize) -> Result<Option<Field>> {
        self.get(&index.to_string())
    }

    /// Whether `key` currently holds a value. Escaped keys test the key they
    /// point at.
    pub fn has(&self, key: &str) -> bool {
        let key = self.options().escaped(key).unwrap_or(key);
        self.track_shape();
        let children = self.inner.children.read();
        match &*children {
            Children::Array(_) if key == "length" => true,
            children => children.slot(key).is_some(),
        }
    }

    /// Present keys in order; array nodes list the indices that are not holes.
    pub fn keys(&self) -> Vec<String> {
        self.track_shape();
        self.inner.children.read().keys()
    }

    /// Number of present keys, or the array length.
    pub fn len(&self) -> usize {
        self.track_shape();
        self.inner.children.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tell every reader below this node that it left the tree. The node
    /// itself keeps its contents for handles that still hold it.
    fn retire_subtree(&self) {
        let slots: Vec<Slot> = match &*self.inner.children.read() {
            Children::Object(map) => map.values().flatten().cloned().collect(),
            Children::Array(items) => items.iter().flatten().cloned().collect(),
        };
        for slot in slots {
            slot.retire();
        }
        self.bump_shape();
    }

    fn track_shape(&self) {
        Runtime::track_read(self.inner.shape.id());
    }

    fn bump_shape(&self) {
        self.inner.shape.update(|n| n.wrapping_add(1));
    }

    fn lookup(&self, key: &str) -> Option<Slot> {
        let (slot, is_array) = {
            let children = self.inner.children.read();
            (
                children.slot(key).cloned(),
                matches!(*children, Children::Array(_)),
            )
        };
        if is_array || slot.is_none() {
            self.track_shape();
        }
        slot
    }

    fn read_slot(&self, key: &str, slot: Slot) -> Result<Field> {
        Ok(match slot {
            Slot::Signal(cell) => Field::Value(cell.get()),
            Slot::Node(node) => Field::Node(node),
            Slot::Shallow(cell) => Field::Shallow(cell.get()),
            Slot::Computed(slot) => Field::Value(self.compute(key, slot.decl)?),
        })
    }

    fn compute(&self, key: &str, decl: Derive) -> Result<Json> {
        match self.mode() {
            Mode::Ssr => self.evaluate_fresh(key, &decl),
            Mode::Spa => match self.materialize(key) {
                Some(memo) => memo.get(),
                None => self.evaluate_fresh(key, &decl),
            },
        }
    }

    /// The memo for the computed at `key`, created on first use.
    pub(crate) fn materialize(&self, key: &str) -> Option<Memo<Json>> {
        let mut children = self.inner.children.write();
        let Some(Slot::Computed(slot)) = children.slot_mut(key) else {
            return None;
        };
        let stale = slot
            .instance
            .as_ref()
            .map_or(true, |instance| !instance.origin.same(&slot.decl));
        if stale {
            slot.instance = Some(Instance {
                origin: slot.decl.clone(),
                memo: self.memo_for(key, slot.decl.clone()),
            });
        }
        slot.instance.as_ref().map(|instance| instance.memo.clone())
    }

    fn memo_for(&self, key: &str, decl: Derive) -> Memo<Json> {
        let owner = Arc::downgrade(&self.inner);
        let key = key.to_string();
        Memo::labeled(key.clone(), move || {
            let inner = owner
                .upgrade()
                .ok_or_else(|| ReifyError::Detached { key: key.clone() })?;
            decl.evaluate(&key, &Node { inner })
        })
    }

    /// Run a declaration without caching. Re-entrant evaluation of the same
    /// key on the same node fails instead of recursing.
    pub(crate) fn evaluate_fresh(&self, key: &str, decl: &Derive) -> Result<Json> {
        thread_local! {
            static EVALUATING: RefCell<Vec<(NodeId, String)>> = const { RefCell::new(Vec::new()) };
        }

        struct Evaluating;
        impl Drop for Evaluating {
            fn drop(&mut self) {
                EVALUATING.with(|stack| {
                    stack.borrow_mut().pop();
                });
            }
        }

        let entered = EVALUATING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(id, k)| *id == self.inner.id && k == key) {
                return false;
            }
            stack.push((self.inner.id, key.to_string()));
            true
        });
        if !entered {
            return Err(ReifyError::CircularComputed {
                label: key.to_string(),
            });
        }
        let _evaluating = Evaluating;
        decl.evaluate(key, self)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children = self.inner.children.read();
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("array", &matches!(*children, Children::Array(_)))
            .field("keys", &children.keys())
            .finish()
    }
}

/// Largest array length; valid indices are below it.
pub(crate) const MAX_LENGTH: usize = u32::MAX as usize;

/// Parse a canonical array index (`"0"`, `"17"`, never `"01"` or `"+1"`).
pub(crate) fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok().filter(|index| *index < MAX_LENGTH)
}
