//! Plain snapshots of a tree.
//!
//! A snapshot reads every leaf, so taking one inside an effect subscribes the
//! effect to the whole tree. Computed keys are left out of objects and show
//! up as `null` inside arrays, as do holes.

use serde::{Serialize, Serializer};

use crate::value::Json;

use super::{Children, Node, Slot};

impl Node {
    /// The current data of this node as plain JSON.
    pub fn to_json(&self) -> Json {
        self.track_shape();
        let children = self.inner.children.read().clone();
        match children {
            Children::Object(map) => Json::Object(
                map.into_iter()
                    .filter_map(|(key, slot)| slot?.snapshot().map(|json| (key, json)))
                    .collect(),
            ),
            Children::Array(items) => Json::Array(
                items
                    .iter()
                    .map(|slot| slot.as_ref().and_then(Slot::snapshot).unwrap_or(Json::Null))
                    .collect(),
            ),
        }
    }
}

impl Slot {
    /// The slot's data, or `None` for computeds.
    pub(crate) fn snapshot(&self) -> Option<Json> {
        match self {
            Slot::Signal(cell) => Some(cell.get()),
            Slot::Node(node) => Some(node.to_json()),
            Slot::Shallow(cell) => Some(cell.with(|raw| raw.to_json())),
            Slot::Computed(_) => None,
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
