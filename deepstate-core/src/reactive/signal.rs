//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    runtime records the running computation as a subscriber.
//!
//! 2. When a signal's value changes, every subscriber is notified.
//!
//! 3. Writing a value equal to the current one is a no-op.
//!
//! Cloning a signal clones the handle, not the cell: every clone reads and
//! writes the same value and shares the same ID.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::runtime::Runtime;
use super::subscriber::{next_source_id, SourceId};

struct SignalInner<T> {
    id: SourceId,
    value: RwLock<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::forget_source(self.id);
    }
}

/// A reactive cell holding a value of type `T`.
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let value = count.get();
/// count.set(5); // notifies subscribers
/// ```
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: next_source_id(),
                value: RwLock::new(value),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value, registering the running computation as a
    /// subscriber.
    pub fn get(&self) -> T {
        Runtime::track_read(self.inner.id);
        self.inner.value.read().clone()
    }

    /// Get the current value without establishing a dependency.
    pub fn peek(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value, registering a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track_read(self.inner.id);
        f(&self.inner.value.read())
    }

    /// Number of computations currently subscribed to this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.id)
    }

    /// Whether two handles point at the same cell.
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Set a new value and notify subscribers.
    ///
    /// Returns `false` when the value was already equal and nothing happened.
    pub fn set(&self, value: T) -> bool {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return false;
            }
            *guard = value;
        }

        trace!(signal = self.inner.id, "signal written");
        Runtime::notify_signal_change(self.inner.id);
        true
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.inner.value.read());
        self.set(next)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ReactiveContext, SubscriberId};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        assert!(signal.set(42));
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn equal_writes_are_ignored() {
        let signal = Signal::new("a".to_string());
        assert!(!signal.set("a".to_string()));
        assert!(signal.set("b".to_string()));
    }

    #[test]
    fn reads_inside_a_context_subscribe() {
        let signal = Signal::new(1);
        let subscriber = SubscriberId::new();

        signal.peek();
        assert_eq!(signal.subscriber_count(), 0);

        {
            let _ctx = ReactiveContext::enter(subscriber);
            signal.get();
            signal.with(|v| *v + 1);
        }
        assert_eq!(signal.subscriber_count(), 1);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert!(signal1.same(&signal2));
        assert_eq!(signal1.id(), signal2.id());
        assert!(!signal1.same(&Signal::new(42)));
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }
}
