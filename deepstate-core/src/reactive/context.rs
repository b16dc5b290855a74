//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! When a source is read, the runtime asks the context for the current
//! subscriber and records the edge.
//!
//! We use a thread-local stack: entering a memo or effect pushes its
//! subscriber, the guard pops it on drop. Nested computations (a memo that
//! reads another memo) push on top of each other.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::subscriber::{SourceId, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct ContextEntry {
    subscriber_id: SubscriberId,
    /// Sources read while this entry was on top, in read order.
    dependencies: SmallVec<[SourceId; 8]>,
}

/// Guard that pops the context when dropped.
///
/// The stack stays balanced even if the computation unwinds.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// The context is exited when the returned guard is dropped.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: SmallVec::new(),
            });
        });

        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.subscriber_id))
    }

    /// Record a read of `source` in the current context.
    ///
    /// Repeated reads of the same source are recorded once.
    pub fn track_dependency(source: SourceId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if !entry.dependencies.contains(&source) {
                    entry.dependencies.push(source);
                }
            }
        });
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Vec<SourceId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.to_vec())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_subscriber() {
        let id = SubscriberId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn context_deduplicates_dependencies() {
        let id = SubscriberId::new();
        let _ctx = ReactiveContext::enter(id);

        ReactiveContext::track_dependency(1);
        ReactiveContext::track_dependency(2);
        ReactiveContext::track_dependency(1);
        ReactiveContext::track_dependency(3);

        assert_eq!(ReactiveContext::get_dependencies(), vec![1, 2, 3]);
    }

    #[test]
    fn nested_contexts() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            ReactiveContext::track_dependency(10);

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
                ReactiveContext::track_dependency(20);
                assert_eq!(ReactiveContext::get_dependencies(), vec![20]);
            }

            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
            assert_eq!(ReactiveContext::get_dependencies(), vec![10]);
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }
}
