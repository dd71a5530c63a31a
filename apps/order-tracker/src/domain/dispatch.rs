//! Typed Event Dispatch
//!
//! A generic multi-subscriber notification mechanism: the registry
//! (and the transport, if it wants one) holds a dispatcher as a field
//! and pushes events through it without knowing who is listening.
//!
//! # Semantics
//!
//! - Listeners run synchronously, in registration order, on the
//!   dispatching thread.
//! - A panicking listener is caught and logged; the remaining
//!   listeners still run.
//! - Subscribing or unsubscribing during a dispatch is safe and takes
//!   effect from the next dispatch round: each round works off a
//!   snapshot of the listener list taken before the first invocation.
//! - No replay: an event is never delivered to a listener registered
//!   after it was dispatched.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

/// A registered callback.
type Listener<E> = dyn Fn(&E) + Send + Sync;

struct Registration<E> {
    id: u64,
    callback: Arc<Listener<E>>,
}

struct Inner<E> {
    next_id: u64,
    listeners: Vec<Registration<E>>,
}

/// Multi-subscriber dispatcher for events of type `E`.
///
/// Cheap to clone; clones share the same listener list.
pub struct EventDispatcher<E> {
    inner: Arc<Mutex<Inner<E>>>,
}

impl<E> Clone for EventDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<E> EventDispatcher<E> {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener.
    ///
    /// Returns a handle whose [`SubscriptionHandle::unsubscribe`]
    /// removes the listener again. Dropping the handle without calling
    /// it leaves the subscription in place.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&E) + Send + Sync + 'static,
        E: 'static,
    {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push(Registration {
                id,
                callback: Arc::new(listener),
            });
            id
        };

        let inner = Arc::downgrade(&self.inner);
        SubscriptionHandle {
            cancel: Some(Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.lock().listeners.retain(|r| r.id != id);
                }
            })),
        }
    }

    /// Invoke every currently registered listener with `event`.
    ///
    /// Listener panics are isolated: they are caught, logged, and do
    /// not prevent the remaining listeners from running.
    pub fn dispatch(&self, event: &E) {
        // Snapshot under the lock, invoke outside it, so listeners may
        // subscribe/unsubscribe reentrantly.
        let snapshot: Vec<(u64, Arc<Listener<E>>)> = {
            let inner = self.inner.lock();
            inner
                .listeners
                .iter()
                .map(|r| (r.id, Arc::clone(&r.callback)))
                .collect()
        };

        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(listener_id = id, "listener panicked during dispatch");
            }
        }
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// Handle returned by [`EventDispatcher::subscribe`].
///
/// Type-erased so callers can hold handles from dispatchers of
/// different event types in one collection.
pub struct SubscriptionHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    /// Remove the listener this handle was issued for.
    ///
    /// Idempotent by construction: the handle is consumed.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn dispatch_reaches_all_listeners_in_registration_order() {
        let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let s1 = seen.clone();
        let _h1 = dispatcher.subscribe(move |e: &u32| s1.lock().unwrap().push(("first", *e)));
        let s2 = seen.clone();
        let _h2 = dispatcher.subscribe(move |e: &u32| s2.lock().unwrap().push(("second", *e)));

        dispatcher.dispatch(&7);

        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let handle = dispatcher.subscribe(move |_: &u32| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count(), 1);

        handle.unsubscribe();
        dispatcher.dispatch(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_the_rest() {
        let dispatcher: EventDispatcher<()> = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _h1 = dispatcher.subscribe(|(): &()| panic!("listener failure"));
        let c = count.clone();
        let _h2 = dispatcher.subscribe(move |(): &()| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(&());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_during_dispatch_applies_next_round() {
        let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
        let late_count = Arc::new(AtomicUsize::new(0));

        let d = dispatcher.clone();
        let lc = late_count.clone();
        let _h = dispatcher.subscribe(move |_: &u32| {
            let lc = lc.clone();
            // Reentrant subscribe: must not see the event in flight.
            let _late = d.subscribe(move |_: &u32| {
                lc.fetch_add(1, Ordering::SeqCst);
            });
        });

        dispatcher.dispatch(&1);
        assert_eq!(late_count.load(Ordering::SeqCst), 0);

        dispatcher.dispatch(&2);
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_during_dispatch_applies_next_round() {
        let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let handle_slot: Arc<StdMutex<Option<SubscriptionHandle>>> =
            Arc::new(StdMutex::new(None));

        let slot = handle_slot.clone();
        let _h1 = dispatcher.subscribe(move |_: &u32| {
            // First listener tears down the second mid-round.
            if let Some(handle) = slot.lock().unwrap().take() {
                handle.unsubscribe();
            }
        });

        let c2 = count.clone();
        let h2 = dispatcher.subscribe(move |_: &u32| {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        *handle_slot.lock().unwrap() = Some(h2);

        // Current round still delivers to the snapshot.
        dispatcher.dispatch(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Next round no longer does.
        dispatcher.dispatch(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_share_listeners() {
        let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
        let clone = dispatcher.clone();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let _h = clone.subscribe(move |_: &u32| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
