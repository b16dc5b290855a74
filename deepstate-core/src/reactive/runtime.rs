//! Reactive Runtime
//!
//! The runtime connects sources (signals, memos) to the subscribers (memos,
//! effects) that read them.
//!
//! # How It Works
//!
//! 1. Memos and effects register with the runtime and get a handle back.
//!
//! 2. When a source is read inside a reactive context, the runtime records
//!    an edge from the source to the running subscriber.
//!
//! 3. When a source changes, the runtime:
//!    a. Finds every subscriber of that source
//!    b. Marks it "maybe dirty" (memos forward this to their own subscribers)
//!    c. Hands eager subscribers (effects) to the batch scheduler
//!
//! The whole propagation runs inside an implicit batch, so an effect only
//! runs once every memo affected by the write has been invalidated.
//!
//! # Storage
//!
//! The registry holds weak references so a dropped memo or effect simply
//! stops receiving notifications. Edges are kept in both directions so a
//! subscriber can drop its stale dependencies before re-running.

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use smallvec::SmallVec;

use super::batch;
use super::context::ReactiveContext;
use super::subscriber::{SourceId, SubscriberId};

/// A computation that can be notified when its dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this reactive value as potentially needing update.
    fn mark_maybe_dirty(&self);

    /// Run the computation (effects only).
    fn run(&self);

    /// Check if this reactive value is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
#[derive(Debug)]
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

type Edges<K, V> = DashMap<K, SmallVec<[V; 4]>>;

static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Reactive>>> = OnceLock::new();
static SUBSCRIBERS: OnceLock<Edges<SourceId, SubscriberId>> = OnceLock::new();
static DEPENDENCIES: OnceLock<Edges<SubscriberId, SourceId>> = OnceLock::new();

fn registry() -> &'static DashMap<SubscriberId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn subscribers() -> &'static Edges<SourceId, SubscriberId> {
    SUBSCRIBERS.get_or_init(DashMap::new)
}

fn dependencies() -> &'static Edges<SubscriberId, SourceId> {
    DEPENDENCIES.get_or_init(DashMap::new)
}

/// The global reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a reactive value with the runtime.
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(reactive: Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.subscriber_id();
        registry().insert(id, Arc::downgrade(&reactive));
        ReactiveHandle { subscriber_id: id }
    }

    fn unregister(id: SubscriberId) {
        registry().remove(&id);
        Self::clear_dependencies(id);
    }

    /// Record a read of `source` by whatever computation is running.
    ///
    /// Outside a reactive context this does nothing.
    pub fn track_read(source: SourceId) {
        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            ReactiveContext::track_dependency(source);
            Self::add_dependency(source, subscriber_id);
        }
    }

    /// Record that a subscriber depends on a source.
    pub fn add_dependency(source: SourceId, subscriber_id: SubscriberId) {
        {
            let mut subs = subscribers().entry(source).or_default();
            if subs.contains(&subscriber_id) {
                return;
            }
            subs.push(subscriber_id);
        }
        dependencies()
            .entry(subscriber_id)
            .or_default()
            .push(source);
    }

    /// Remove all dependencies for a subscriber.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    pub fn clear_dependencies(subscriber_id: SubscriberId) {
        let Some((_, sources)) = dependencies().remove(&subscriber_id) else {
            return;
        };
        for source in sources {
            if let Some(mut subs) = subscribers().get_mut(&source) {
                subs.retain(|s| *s != subscriber_id);
            }
        }
    }

    /// Drop every edge that starts at `source`. Called when a source is freed.
    pub(crate) fn forget_source(source: SourceId) {
        let Some((_, subs)) = subscribers().remove(&source) else {
            return;
        };
        for subscriber_id in subs {
            if let Some(mut sources) = dependencies().get_mut(&subscriber_id) {
                sources.retain(|s| *s != source);
            }
        }
    }

    /// Notify all subscribers that a source changed.
    ///
    /// This is the core update propagation mechanism.
    pub fn notify_signal_change(source: SourceId) {
        let subscriber_ids: SmallVec<[SubscriberId; 4]> = match subscribers().get(&source) {
            Some(subs) => subs.value().clone(),
            None => return,
        };

        if subscriber_ids.is_empty() {
            return;
        }

        batch::batch(|| {
            let mut eager = Vec::new();
            for id in subscriber_ids {
                let reactive = registry().get(&id).and_then(|weak| weak.upgrade());
                match reactive {
                    Some(reactive) => {
                        reactive.mark_maybe_dirty();
                        if reactive.is_eager() {
                            eager.push(reactive);
                        }
                    }
                    None => {
                        registry().remove(&id);
                        Self::clear_dependencies(id);
                    }
                }
            }
            for reactive in eager {
                batch::schedule(reactive);
            }
        });
    }

    /// Number of subscribers currently reading `source`.
    pub fn subscriber_count(source: SourceId) -> usize {
        subscribers().get(&source).map(|subs| subs.len()).unwrap_or(0)
    }

    /// Number of sources `subscriber_id` read on its last run.
    pub fn dependency_count(subscriber_id: SubscriberId) -> usize {
        dependencies()
            .get(&subscriber_id)
            .map(|sources| sources.len())
            .unwrap_or(0)
    }
}
