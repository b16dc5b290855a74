//! Reactive Primitives
//!
//! This module implements the machinery underneath every tree: signals,
//! memos, effects and batching.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal registers
//! that context as a dependent. When the value changes, all dependents are
//! notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes. Tree computeds are memos in SPA mode.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. External subscribers to a tree are effects.
//!
//! ## Batches
//!
//! A batch defers effect execution until its body returns, so several writes
//! produce one notification pass.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: a thread-local context stack records
//! which computation is running, and every read reports itself to the runtime.

mod batch;
mod context;
mod effect;
mod memo;
mod runtime;
mod signal;
mod subscriber;

pub use batch::{batch, is_batching};
pub use context::ReactiveContext;
pub use effect::Effect;
pub use memo::{Memo, MemoState};
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::Signal;
pub use subscriber::{SourceId, SubscriberId};
