//! Listener lists for components that publish state changes
//!
//! Listeners are invoked synchronously after each mutation, outside any
//! component lock, in registration order. A panicking listener is reported
//! on the diagnostic channel and the remaining listeners still run.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

struct Registry<A: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Arc<dyn Fn(&A) + Send + Sync>)>,
}

/// Set of registered listeners receiving `&A`
pub struct Listeners<A: ?Sized> {
    inner: Arc<Mutex<Registry<A>>>,
}

impl<A: ?Sized + 'static> Listeners<A> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener; it stays registered until the returned handle
    /// is unsubscribed or dropped
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let callback: Arc<dyn Fn(&A) + Send + Sync> = Arc::new(listener);
        let id = {
            let mut registry = self.inner.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, callback));
            id
        };

        let weak: Weak<Mutex<Registry<A>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().entries.retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Invoke every listener with `arg`
    pub fn notify(&self, arg: &A) {
        // Snapshot so listeners may subscribe/unsubscribe re-entrantly
        let snapshot: Vec<Arc<dyn Fn(&A) + Send + Sync>> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(arg))).is_err() {
                crate::log_pipeline!(tracing::Level::ERROR, "listener panicked during notification");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl<A: ?Sized + 'static> Default for Listeners<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`
///
/// Dropping it removes the listener. Call [`detach`](Self::detach) to keep
/// the listener for the lifetime of the publisher instead.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Keep the listener registered without holding the handle
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_and_unsubscribe() {
        let listeners = Listeners::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let sub = listeners.subscribe(move |v| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        });

        listeners.notify(&2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        sub.unsubscribe();
        listeners.notify(&5);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let listeners = Listeners::<()>::new();
        {
            let _sub = listeners.subscribe(|_| {});
            assert_eq!(listeners.len(), 1);
        }
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn test_detach_keeps_listener() {
        let listeners = Listeners::<()>::new();
        listeners.subscribe(|_| {}).detach();
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let listeners = Listeners::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = listeners.subscribe(|_| panic!("listener failure"));
        let counter = Arc::clone(&hits);
        let _good = listeners.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        listeners.notify(&());
        listeners.notify(&());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_after_publisher_dropped() {
        let listeners = Listeners::<()>::new();
        let sub = listeners.subscribe(|_| {});
        drop(listeners);
        sub.unsubscribe();
    }
}
