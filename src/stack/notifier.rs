//! Synchronous multi-subscriber broadcast.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`Notifier::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// An explicit subscriber list with a synchronous broadcast.
///
/// [`fire_with`](Notifier::fire_with) calls every subscriber once, in
/// subscription order, on the calling thread. It works on a snapshot taken
/// when the call starts, so callbacks may subscribe or unsubscribe freely:
/// changes apply from the next broadcast on.
pub struct Notifier<A = ()> {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Callback<A>)>>,
}

impl<A> Notifier<A> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback.
    pub fn subscribe(&self, callback: impl Fn(&A) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Call every subscriber with `value`.
    pub fn fire_with(&self, value: &A) {
        let snapshot: Vec<Callback<A>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier<()> {
    /// Call every subscriber.
    pub fn fire(&self) {
        self.fire_with(&());
    }
}

impl<A> Default for Notifier<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Notifier<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.len())
            .finish()
    }
}
