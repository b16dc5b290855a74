//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation inside a reactive
//!    context and caches the result. Every source read during the run
//!    becomes a dependency.
//!
//! 2. When accessed again, if no dependency has changed, the cached value is
//!    returned.
//!
//! 3. When a dependency changes, the runtime marks the memo "maybe dirty" and
//!    the memo forwards the notification to its own subscribers.
//!
//! 4. The next access recomputes.
//!
//! A memo that is never read again stays dirty and costs nothing.
//!
//! # Failure Modes
//!
//! - The computation returns an error: the error is returned, the previous
//!   cached value is kept, and the memo stays dirty so the next read retries.
//!   The next dependency change is still forwarded to subscribers, so readers
//!   that saw the error get a chance to see the recovery.
//! - A dependency changes while the computation is running: the fresh value
//!   is cached but the memo stays dirty.
//! - The computation reads its own memo on the same thread:
//!   `CircularComputed`. Readers on other threads wait for the running
//!   computation and share its result.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::{next_source_id, SourceId, SubscriberId};
use crate::error::{ReifyError, Result};

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency might have changed.
    MaybeDirty,

    /// The memo definitely needs to recompute.
    Dirty,
}

type ComputeFn<T> = dyn Fn() -> Result<T> + Send + Sync;

struct MemoInner<T> {
    /// Source ID other computations use to depend on this memo.
    id: SourceId,

    /// The subscriber ID used while the computation runs.
    subscriber_id: SubscriberId,

    label: String,
    compute: Box<ComputeFn<T>>,
    value: RwLock<Option<T>>,
    state: RwLock<MemoState>,
    /// Whether the last run returned an error.
    failed: AtomicBool,
    /// Held for the whole of a recompute so threads never run it twice.
    recompute_lock: Mutex<()>,
    compute_count: AtomicU64,
}

impl<T: Clone> MemoInner<T> {
    /// Move to `next`, forwarding the change to dependents if the memo was
    /// clean or its last run failed.
    fn invalidate(&self, next: MemoState) {
        let was_clean = {
            let mut state = self.state.write();
            let was_clean = *state == MemoState::Clean;
            if was_clean || next == MemoState::Dirty {
                *state = next;
            }
            was_clean
        };
        let had_failed = self.failed.swap(false, Ordering::SeqCst);
        if was_clean || had_failed {
            Runtime::notify_signal_change(self.id);
        }
    }

    fn cached(&self) -> Option<T> {
        if *self.state.read() == MemoState::Clean {
            self.value.read().clone()
        } else {
            None
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Reactive for MemoInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self) {
        self.invalidate(MemoState::MaybeDirty);
    }

    fn run(&self) {}

    fn is_eager(&self) -> bool {
        false
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        Runtime::forget_source(self.id);
    }
}

thread_local! {
    static COMPUTING: RefCell<Vec<SourceId>> = const { RefCell::new(Vec::new()) };
}

/// Marks a memo as running on this thread; popped even if the computation
/// unwinds.
struct Computing;

impl Computing {
    fn enter(id: SourceId) -> Self {
        COMPUTING.with(|stack| stack.borrow_mut().push(id));
        Computing
    }

    fn contains(id: SourceId) -> bool {
        COMPUTING.with(|stack| stack.borrow().contains(&id))
    }
}

impl Drop for Computing {
    fn drop(&mut self) {
        COMPUTING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Cloning a memo creates another handle to the same cache.
pub struct Memo<T> {
    inner: Arc<MemoInner<T>>,
    _handle: Arc<ReactiveHandle>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::labeled("memo", compute)
    }

    /// Create a memo with a label used in errors and traces.
    pub fn labeled<F>(label: impl Into<String>, compute: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            id: next_source_id(),
            subscriber_id: SubscriberId::new(),
            label: label.into(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            state: RwLock::new(MemoState::Dirty),
            failed: AtomicBool::new(false),
            recompute_lock: Mutex::new(()),
            compute_count: AtomicU64::new(0),
        });
        let handle = Runtime::register(inner.clone());
        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the memo's source ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> Result<T> {
        let inner = &self.inner;
        if Computing::contains(inner.id) {
            return Err(ReifyError::CircularComputed {
                label: inner.label.clone(),
            });
        }

        Runtime::track_read(inner.id);

        if let Some(value) = inner.cached() {
            return Ok(value);
        }
        self.recompute()
    }

    /// Mark the memo as potentially needing recomputation.
    pub fn mark_maybe_dirty(&self) {
        self.inner.invalidate(MemoState::MaybeDirty);
    }

    /// Mark the memo as definitely needing recomputation.
    pub fn mark_dirty(&self) {
        self.inner.invalidate(MemoState::Dirty);
    }

    fn recompute(&self) -> Result<T> {
        let inner = &self.inner;
        let _serial = inner.recompute_lock.lock();
        // Another thread may have finished the run we were waiting on.
        if let Some(value) = inner.cached() {
            return Ok(value);
        }
        let _computing = Computing::enter(inner.id);

        Runtime::clear_dependencies(inner.subscriber_id);

        // Clean before running: a dependency written mid-run flips it back.
        *inner.state.write() = MemoState::Clean;

        let result = {
            let _ctx = ReactiveContext::enter(inner.subscriber_id);
            (inner.compute)()
        };
        let runs = inner.compute_count.fetch_add(1, Ordering::Relaxed) + 1;

        match result {
            Ok(value) => {
                *inner.value.write() = Some(value.clone());
                inner.failed.store(false, Ordering::SeqCst);
                trace!(memo = %inner.label, runs, "memo recomputed");
                Ok(value)
            }
            Err(err) => {
                *inner.state.write() = MemoState::Dirty;
                inner.failed.store(true, Ordering::SeqCst);
                trace!(memo = %inner.label, runs, "memo computation failed");
                Err(err)
            }
        }
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.read()
    }

    /// Number of times the computation has run.
    pub fn compute_count(&self) -> u64 {
        self.inner.compute_count.load(Ordering::Relaxed)
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Whether two handles share the same cache.
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl<T> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("state", &*self.inner.state.read())
            .field("compute_count", &self.inner.compute_count.load(Ordering::Relaxed))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
