//! Named operations bound to a tree.
//!
//! An [`ActionMap`] collects functions that take the root state as their
//! first argument. Attaching it to a store merges it into the store's
//! [`Actions`] namespace, which resolves names only when an action is
//! dispatched.
//!
//! Actions are not batched for you. Wrap the body in [`crate::batch`] when
//! several writes should notify once. A batch cannot span an `.await`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{ReifyError, Result};
use crate::tree::Node;
use crate::value::Json;

type SyncFn = dyn Fn(&Node, &[Json]) -> Result<Json> + Send + Sync;
type AsyncFn = dyn Fn(Node, Vec<Json>) -> BoxFuture<'static, Result<Json>> + Send + Sync;

#[derive(Clone)]
enum Action {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

/// A set of actions waiting to be attached.
#[derive(Clone, Default)]
pub struct ActionMap {
    entries: IndexMap<String, Action>,
}

impl ActionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a synchronous action.
    pub fn action<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Node, &[Json]) -> Result<Json> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Action::Sync(Arc::new(f)));
        self
    }

    /// Add an action that returns a future.
    ///
    /// The future owns its handle to the state, so other code may read and
    /// write the tree while it is suspended.
    pub fn async_action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Node, Vec<Json>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Json>> + Send + 'static,
    {
        let boxed: Arc<AsyncFn> = Arc::new(move |state: Node, args: Vec<Json>| f(state, args).boxed());
        self.entries.insert(name.into(), Action::Async(boxed));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for ActionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionMap")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The dispatch namespace of a store.
///
/// Clones share the same table, so actions attached later are visible to
/// every handle.
#[derive(Clone)]
pub struct Actions {
    state: Node,
    table: Arc<RwLock<IndexMap<String, Action>>>,
}

impl Actions {
    pub(crate) fn new(state: Node) -> Self {
        Self {
            state,
            table: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Merge `map` in. Names already present are replaced.
    pub(crate) fn merge(&self, map: ActionMap) {
        let added = map.len();
        let total = {
            let mut table = self.table.write();
            table.extend(map.entries);
            table.len()
        };
        debug!(added, total, "attached actions");
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.read().contains_key(name)
    }

    /// Whether `name` is asynchronous; `None` if it is not attached.
    pub fn is_async(&self, name: &str) -> Option<bool> {
        self.table
            .read()
            .get(name)
            .map(|action| matches!(action, Action::Async(_)))
    }

    pub fn names(&self) -> Vec<String> {
        self.table.read().keys().cloned().collect()
    }

    /// Dispatch a synchronous action as `f(state, args)`.
    pub fn call(&self, name: &str, args: &[Json]) -> Result<Json> {
        match self.lookup(name)? {
            Action::Sync(f) => {
                debug!(action = name, args = args.len(), "dispatching action");
                f(&self.state, args)
            }
            Action::Async(_) => {
                warn!(action = name, "async action dispatched synchronously");
                Err(ReifyError::AsyncAction {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Dispatch any action and wait for its result.
    pub async fn call_async(&self, name: &str, args: Vec<Json>) -> Result<Json> {
        let action = self.lookup(name)?;
        debug!(action = name, args = args.len(), "dispatching action");
        match action {
            Action::Sync(f) => f(&self.state, &args),
            Action::Async(f) => f(self.state.clone(), args).await,
        }
    }

    fn lookup(&self, name: &str) -> Result<Action> {
        // Clone out so the table lock is not held while the action runs.
        let action = self.table.read().get(name).cloned();
        action.ok_or_else(|| {
            warn!(action = name, "unknown action");
            ReifyError::UnknownAction {
                name: name.to_string(),
            }
        })
    }
}

impl fmt::Debug for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actions")
            .field("names", &self.names())
            .finish()
    }
}
