//! Subscription hub
//!
//! Fan-out notification layer: every task-map mutation delivers an
//! immutable snapshot of the merged task map to every registered observer,
//! synchronously on the mutating call path. The listener list is copied
//! before iteration, so a callback may subscribe, unsubscribe (itself
//! included), or invoke scheduler operations without invalidating the
//! iteration. Delivery order across subscribers is unspecified.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::app::models::TaskSnapshot;

/// Handle identifying one subscription; dropping it does not unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Observer callback receiving the merged task snapshot
pub type SubscriberFn = Arc<dyn Fn(&TaskSnapshot) + Send + Sync>;

/// Registry of observers notified on every task-map mutation
#[derive(Default)]
pub struct SubscriptionHub {
    subscribers: Mutex<HashMap<u64, SubscriberFn>>,
    next_id: AtomicU64,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; returns the id needed to unsubscribe
    pub fn subscribe(&self, callback: SubscriberFn) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .expect("hub lock poisoned")
            .insert(id, callback);
        debug!(subscription = id, "Subscriber registered");
        SubscriptionId(id)
    }

    /// Remove an observer; safe to call repeatedly and from within a
    /// callback
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self
            .subscribers
            .lock()
            .expect("hub lock poisoned")
            .remove(&id.0)
            .is_some();
        if removed {
            debug!(subscription = id.0, "Subscriber removed");
        }
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.subscribers.lock().expect("hub lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `snapshot` to every observer
    ///
    /// The listener list is snapshotted under the lock and invoked with the
    /// lock released (copy-on-notify), so reentrant hub or scheduler calls
    /// from a callback cannot deadlock or corrupt iteration.
    pub fn notify(&self, snapshot: &TaskSnapshot) {
        let listeners: Vec<SubscriberFn> = {
            let subscribers = self.subscribers.lock().expect("hub lock poisoned");
            subscribers.values().cloned().collect()
        };
        for listener in listeners {
            listener(snapshot);
        }
    }
}

impl fmt::Debug for SubscriptionHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHub")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribers_receive_snapshot() {
        let hub = SubscriptionHub::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_a = Arc::clone(&calls);
        hub.subscribe(Arc::new(move |_| {
            calls_a.fetch_add(1, Ordering::SeqCst);
        }));
        let calls_b = Arc::clone(&calls);
        hub.subscribe(Arc::new(move |_| {
            calls_b.fetch_add(1, Ordering::SeqCst);
        }));

        hub.notify(&TaskSnapshot::new());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let hub = SubscriptionHub::new();
        let id = hub.subscribe(Arc::new(|_| {}));
        assert_eq!(hub.len(), 1);

        hub.unsubscribe(id);
        hub.unsubscribe(id);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_unsubscribe_from_within_callback() {
        let hub = Arc::new(SubscriptionHub::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let hub_inner = Arc::clone(&hub);
        let calls_inner = Arc::clone(&calls);
        // The callback unsubscribes itself on first delivery
        let id_cell = Arc::new(Mutex::new(None::<SubscriptionId>));
        let id_cell_inner = Arc::clone(&id_cell);
        let id = hub.subscribe(Arc::new(move |_| {
            calls_inner.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *id_cell_inner.lock().unwrap() {
                hub_inner.unsubscribe(id);
            }
        }));
        *id_cell.lock().unwrap() = Some(id);

        hub.notify(&TaskSnapshot::new());
        hub.notify(&TaskSnapshot::new());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_from_within_callback() {
        let hub = Arc::new(SubscriptionHub::new());
        let hub_inner = Arc::clone(&hub);

        hub.subscribe(Arc::new(move |_| {
            hub_inner.subscribe(Arc::new(|_| {}));
        }));

        hub.notify(&TaskSnapshot::new());
        assert_eq!(hub.len(), 2);
    }
}
