//! The entry point: a reactive tree plus its actions.

use tracing::debug;

use crate::actions::{ActionMap, Actions};
use crate::error::Result;
use crate::options::Options;
use crate::tree::{build_root, Node};
use crate::value::{Json, Value};

/// Turn `value` into a reactive tree.
///
/// The root must be an object; anything else fails with `InvalidRootShape`.
pub fn reify(value: impl Into<Value>, options: Options) -> Result<Store> {
    let state = build_root(value.into(), options)?;
    Ok(Store {
        actions: Actions::new(state.clone()),
        state,
    })
}

/// A reactive tree and the actions bound to it.
#[derive(Clone, Debug)]
pub struct Store {
    pub state: Node,
    pub actions: Actions,
}

impl Store {
    /// Bind more actions. Returns the store so calls can be chained.
    pub fn attach(self, map: ActionMap) -> Self {
        debug!(names = ?map.names().collect::<Vec<_>>(), "attaching actions");
        self.actions.merge(map);
        self
    }

    pub fn options(&self) -> &Options {
        self.state.options()
    }

    /// Current data, without computeds.
    pub fn to_json(&self) -> Json {
        self.state.to_json()
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.state)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.state)?)
    }

    /// The same snapshot as [`Store::to_json`], encoded as MessagePack.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(&self.state)?)
    }
}
