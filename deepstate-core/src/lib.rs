//! Deepstate Core
//!
//! Deep reactive state trees. [`reify`] takes a plain data value and turns it
//! into a tree of reactive cells:
//!
//! - Primitive leaves become signals
//! - Nested objects and arrays become child nodes
//! - Computed declarations become memos (SPA) or are re-run on every read (SSR)
//! - Values marked with [`shallow`] are stored by reference
//!
//! Reads inside a memo or an [`Effect`] subscribe to exactly what was read;
//! writes notify those subscribers, immediately or once at the end of the
//! enclosing [`batch`].
//!
//! # Architecture
//!
//! - `reactive`: signals, memos, effects, batching and dependency tracking
//! - `tree`: nodes, the builder, the mutation guard and the escape hatch
//! - `actions`: named operations bound to a tree
//! - `store`: [`reify`] and [`Store`]
//!
//! # Example
//!
//! ```rust,ignore
//! use deepstate_core::{reify, Effect, Options, Value};
//! use serde_json::json;
//!
//! let store = reify(
//!     Value::object([
//!         ("count", Value::from(0)),
//!         ("double", Value::computed(|this| {
//!             Ok(json!(this.json("count")?.as_i64().unwrap_or(0) * 2))
//!         })),
//!     ]),
//!     Options::default(),
//! )?;
//!
//! let state = store.state.clone();
//! let _render = Effect::new(move || {
//!     println!("double is {}", state.json("double").unwrap());
//! });
//!
//! store.state.set("count", 5)?; // prints "double is 10"
//! ```

pub mod actions;
pub mod error;
pub mod options;
pub mod reactive;
pub mod store;
pub mod tree;
pub mod value;

pub use actions::{ActionMap, Actions};
pub use error::{ReifyError, Result};
pub use options::{Mode, Options};
pub use reactive::{batch, is_batching, Effect, Memo, Signal};
pub use store::{reify, Store};
pub use tree::{Computed, Field, Node, NodeId};
pub use value::{shallow, Derive, Json, Shallow, Value};
