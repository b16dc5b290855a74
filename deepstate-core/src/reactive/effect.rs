//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. It is how code outside the tree (a renderer, a
//! logger, a test probe) subscribes to it.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs right after the write,
//!    or once after the enclosing batch.
//!
//! 3. Before re-running, the effect clears its old dependencies and tracks
//!    new ones during execution.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//!
//! # Lifetime
//!
//! The effect stays subscribed while any handle to it is alive. Dropping the
//! last handle or calling [`Effect::dispose`] stops it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::SubscriberId;

struct EffectInner {
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() + Send + Sync>,
    disposed: AtomicBool,
    running: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        // Writes the effect makes to its own dependencies do not re-trigger it.
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        struct Running<'a>(&'a AtomicBool);
        impl Drop for Running<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }
        let _running = Running(&self.running);

        Runtime::clear_dependencies(self.subscriber_id);
        {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            (self.run)();
        }

        let runs = self.run_count.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(effect = self.subscriber_id.raw(), runs, "effect ran");
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self) {}

    fn run(&self) {
        self.execute();
    }

    fn is_eager(&self) -> bool {
        true
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let probe = count.clone();
/// let effect = Effect::new(move || println!("count is {}", probe.get()));
/// count.set(5); // prints "count is 5"
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
    _handle: Arc<ReactiveHandle>,
}

impl Effect {
    /// Create a new effect. The function runs immediately.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it.
    ///
    /// It has no dependencies until [`Effect::execute`] is called.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            disposed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        let handle = Runtime::register(inner.clone());
        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Run the effect function now, re-tracking its dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Stop the effect. It will not run again.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        Runtime::clear_dependencies(self.inner.subscriber_id);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.subscriber_id)
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("subscriber_id", &self.inner.subscriber_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
