//! Subscriber registry with explicit unsubscribe handles.
//!
//! Listeners are invoked synchronously, in registration order, against a
//! snapshot of the registry: unsubscribing (or subscribing) during a
//! dispatch pass affects later passes only and never panics.

use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

struct Slot<T> {
    id: u64,
    callback: Callback<T>,
}

struct Slots<T> {
    next_id: u64,
    entries: Vec<Slot<T>>,
}

/// A set of listeners for one event kind.
pub struct Registry<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Registers a listener, returning its unsubscribe handle.
    pub fn subscribe<F>(&self, listener: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut slots = lock(&self.slots);
        let id = slots.next_id;
        slots.next_id += 1;
        slots.entries.push(Slot {
            id,
            callback: Arc::new(listener),
        });
        Subscription {
            id,
            slots: Arc::downgrade(&self.slots),
        }
    }

    /// Invokes every listener with `value`, in registration order.
    pub fn emit(&self, value: &T) {
        // Snapshot under the lock, dispatch outside it, so a listener may
        // subscribe or unsubscribe without deadlocking or perturbing this
        // pass.
        let snapshot: Vec<Callback<T>> = lock(&self.slots)
            .entries
            .iter()
            .map(|slot| Arc::clone(&slot.callback))
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.slots).entries.len()
    }

    /// Whether no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every listener; used on teardown so nothing is notified
    /// after shutdown.
    pub fn clear(&self) {
        lock(&self.slots).entries.clear();
    }
}

fn lock<T>(slots: &Arc<Mutex<Slots<T>>>) -> std::sync::MutexGuard<'_, Slots<T>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unsubscribe handle returned by [`Registry::subscribe`].
///
/// Dropping the handle does NOT unsubscribe; call [`Subscription::unsubscribe`].
/// Unsubscribing twice (or after the registry is gone) is a no-op.
pub struct Subscription<T> {
    id: u64,
    slots: Weak<Mutex<Slots<T>>>,
}

impl<T> Subscription<T> {
    /// Removes the listener from the registry.
    pub fn unsubscribe(self) {
        if let Some(slots) = self.slots.upgrade() {
            lock(&slots).entries.retain(|slot| slot.id != self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listeners_fire_in_registration_order() {
        let registry: Registry<u32> = Registry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            let _ = registry.subscribe(move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        registry.emit(&1);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_future_dispatches() {
        let registry: Registry<u32> = Registry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let subscription = registry.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        registry.emit(&1);
        subscription.unsubscribe();
        registry.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribing_mid_dispatch_does_not_affect_current_pass() {
        let registry: Registry<u32> = Registry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let victim = Arc::new(Mutex::new(None::<Subscription<u32>>));
        {
            let victim = Arc::clone(&victim);
            let _ = registry.subscribe(move |_| {
                // First listener tears down the second one.
                if let Some(sub) = victim.lock().unwrap().take() {
                    sub.unsubscribe();
                }
            });
        }
        {
            let seen = Arc::clone(&count);
            let sub = registry.subscribe(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
            *victim.lock().unwrap() = Some(sub);
        }

        // The second listener still runs this pass, then never again.
        registry.emit(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        registry.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_silences_everyone() {
        let registry: Registry<u32> = Registry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let _subscription = registry.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        registry.clear();
        registry.emit(&1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
