//! Error types for reactive trees.
//!
//! Every violation is raised synchronously at the point where it happens.
//! Nothing in the crate retries or swallows these errors.

/// Errors raised while building, reading, mutating or dispatching on a tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReifyError {
    /// The value handed to `reify` is not a plain object.
    #[error("reify expects a plain object at the root, got {found}")]
    InvalidRootShape { found: &'static str },

    /// Strict trees reject keys that were not part of the initial shape, and
    /// arrays in either mode reject keys that are not indices.
    #[error("cannot {op} unknown property `{key}` on a {mode} tree")]
    UnknownProperty {
        key: String,
        op: &'static str,
        mode: &'static str,
    },

    /// A deep collection, a signal cell or a computed cannot be swapped out.
    #[error("cannot replace the {found} at `{key}`; mutate its contents instead")]
    ReplacementDisallowed { key: String, found: &'static str },

    /// A computed that takes `root` was evaluated while no root is reachable.
    #[error("computed `{key}` needs the tree root, but the root is unavailable")]
    RootUnavailable { key: String },

    /// Dispatch to an action that was never attached.
    #[error("actions.{name} is not a function")]
    UnknownAction { name: String },

    /// Escape-hatch properties are read-only.
    #[error("`{key}` is an escape-hatch property and cannot be assigned or deleted")]
    EscapeHatchAssignment { key: String },

    /// `Actions::call` was used on an action that returns a future.
    #[error("actions.{name} is asynchronous; dispatch it with call_async")]
    AsyncAction { name: String },

    /// `length` was written with something other than a non-negative integer.
    #[error("invalid array length {value}")]
    InvalidLength { value: String },

    /// An array operation was applied to an object node.
    #[error("cannot {op} on an object node")]
    NotAnArray { op: &'static str },

    /// A computed read itself while it was being evaluated.
    #[error("computed `{label}` depends on itself")]
    CircularComputed { label: String },

    /// The node owning a computed no longer exists.
    #[error("computed `{key}` belongs to a node that has been dropped")]
    Detached { key: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Error raised by user code inside a computed or an action.
    #[error("{0}")]
    Message(String),
}

impl ReifyError {
    /// Build a user-level error from any message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn unknown_property(key: &str, op: &'static str, permissive: bool) -> Self {
        Self::UnknownProperty {
            key: key.to_string(),
            op,
            mode: if permissive { "permissive" } else { "strict" },
        }
    }
}

impl From<serde_json::Error> for ReifyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for ReifyError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T, E = ReifyError> = std::result::Result<T, E>;
