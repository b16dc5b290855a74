//! Batch Scheduler
//!
//! Coalesces the notifications produced by several writes so each affected
//! effect runs once, after the outermost batch returns.
//!
//! Batches nest: inner batches flatten into the outermost one. A batch is
//! strictly synchronous and lives on the current thread; it cannot span an
//! `.await`.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use super::runtime::Reactive;
use super::subscriber::SubscriberId;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static PENDING: RefCell<IndexMap<SubscriberId, Arc<dyn Reactive>>> =
        RefCell::new(IndexMap::new());
}

/// Run `f` with notifications deferred until the outermost batch exits.
///
/// Returns whatever `f` returns. Effects triggered inside the batch run at
/// most once each, in the order they were first triggered.
///
/// ```rust,ignore
/// batch(|| {
///     todos.push(first)?;
///     todos.push(second)
/// })?;
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::enter();
    f()
}

/// Whether a batch is open on this thread.
pub fn is_batching() -> bool {
    DEPTH.with(|depth| depth.get() > 0)
}

/// Run an eager subscriber now, or queue it if a batch is open.
pub(crate) fn schedule(reactive: Arc<dyn Reactive>) {
    if is_batching() {
        PENDING.with(|pending| {
            pending
                .borrow_mut()
                .entry(reactive.subscriber_id())
                .or_insert(reactive);
        });
    } else {
        reactive.run();
    }
}

fn flush() {
    loop {
        let pending = PENDING.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
        if pending.is_empty() {
            break;
        }
        trace!(effects = pending.len(), "flushing batch");
        for (_, reactive) in pending {
            reactive.run();
        }
    }
}

struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let outermost = DEPTH.with(|depth| {
            let next = depth.get() - 1;
            depth.set(next);
            next == 0
        });
        if !outermost {
            return;
        }
        if std::thread::panicking() {
            PENDING.with(|pending| pending.borrow_mut().clear());
        } else {
            flush();
        }
    }
}
