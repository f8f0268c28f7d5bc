//! Callback slots invoked when a notification arrives.

use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::Arc;

type NotifyFn = dyn Fn() + Send + Sync;
type PayloadFn = dyn Fn(&str) + Send + Sync;

/// A callback in one of the two supported shapes.
#[derive(Clone)]
pub enum Callback {
    /// Called with no arguments for every delivered notification.
    Notify(Arc<NotifyFn>),
    /// Called with the received payload text: the JSON message, or the raw
    /// legacy ping line.
    Payload(Arc<PayloadFn>),
}

impl Callback {
    /// Wrap a zero-argument closure.
    pub fn notify<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Callback::Notify(Arc::new(callback))
    }

    /// Wrap a payload-receiving closure.
    pub fn payload<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Callback::Payload(Arc::new(callback))
    }

    fn invoke(&self, payload: &str) {
        match self {
            Callback::Notify(f) => f(),
            Callback::Payload(f) => f(payload),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Notify(_) => f.write_str("Callback::Notify"),
            Callback::Payload(_) => f.write_str("Callback::Payload"),
        }
    }
}

/// Holds the active callbacks of one watcher.
///
/// Each shape has its own slot, and setting one never clears the other. When
/// both are set, both run for every delivery: the zero-argument callback
/// first, then the payload callback. Slots are swapped atomically, so a
/// delivery that starts after [`set`](Self::set) returns always sees the new
/// callback and never a half-replaced one.
///
/// # Examples
///
/// ```rust
/// use policy_watcher::notify::{Callback, CallbackRegistry};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let registry = CallbackRegistry::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let hits_clone = Arc::clone(&hits);
/// registry.set(Callback::notify(move || {
///     hits_clone.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// registry.dispatch("payload");
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct CallbackRegistry {
    notify: ArcSwapOption<Callback>,
    payload: ArcSwapOption<Callback>,
}

impl CallbackRegistry {
    /// Create a registry with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a callback, replacing any previous one of the same shape.
    pub fn set(&self, callback: Callback) {
        let slot = match &callback {
            Callback::Notify(_) => &self.notify,
            Callback::Payload(_) => &self.payload,
        };
        slot.store(Some(Arc::new(callback)));
    }

    /// Remove both callbacks.
    pub fn clear(&self) {
        self.notify.store(None);
        self.payload.store(None);
    }

    /// Whether any callback is installed.
    pub fn is_empty(&self) -> bool {
        self.notify.load().is_none() && self.payload.load().is_none()
    }

    /// Run the installed callbacks for one delivered payload.
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&self, payload: &str) -> usize {
        let mut invoked = 0;
        for slot in [&self.notify, &self.payload] {
            if let Some(callback) = slot.load_full() {
                callback.invoke(payload);
                invoked += 1;
            }
        }
        invoked
    }

    /// Run only the zero-argument callback.
    ///
    /// Used for deliveries that are not a recognizable message: peers still
    /// learn that something changed, but there is no payload worth handing on.
    /// Returns the number of callbacks invoked.
    pub fn dispatch_notify(&self) -> usize {
        match self.notify.load_full() {
            Some(callback) => {
                callback.invoke("");
                1
            }
            None => 0,
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("notify", &self.notify.load().is_some())
            .field("payload", &self.payload.load().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_registry_dispatches_nothing() {
        let registry = CallbackRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.dispatch("x"), 0);
    }

    #[test]
    fn test_payload_callback_receives_text() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        registry.set(Callback::payload(move |p| seen_clone.lock().unwrap().push(p.to_string())));

        registry.dispatch("one");
        registry.dispatch("two");
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn test_both_shapes_fire() {
        let registry = CallbackRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_clone = Arc::clone(&order);
        registry.set(Callback::payload(move |_| order_clone.lock().unwrap().push("payload")));
        let order_clone = Arc::clone(&order);
        registry.set(Callback::notify(move || order_clone.lock().unwrap().push("notify")));

        assert_eq!(registry.dispatch("x"), 2);
        assert_eq!(*order.lock().unwrap(), vec!["notify", "payload"]);
    }

    #[test]
    fn test_replacement_only_hits_new_callback() {
        let registry = CallbackRegistry::new();
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));

        let old_clone = Arc::clone(&old);
        registry.set(Callback::notify(move || {
            old_clone.fetch_add(1, Ordering::SeqCst);
        }));
        registry.dispatch("x");

        let new_clone = Arc::clone(&new);
        registry.set(Callback::notify(move || {
            new_clone.fetch_add(1, Ordering::SeqCst);
        }));
        registry.dispatch("x");
        registry.dispatch("x");

        assert_eq!(old.load(Ordering::SeqCst), 1);
        assert_eq!(new.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_setting_one_shape_keeps_the_other() {
        let registry = CallbackRegistry::new();
        registry.set(Callback::notify(|| {}));
        registry.set(Callback::payload(|_| {}));
        registry.set(Callback::notify(|| {}));
        assert_eq!(registry.dispatch("x"), 2);
    }

    #[test]
    fn test_dispatch_notify_skips_payload_slot() {
        let registry = CallbackRegistry::new();
        let notified = Arc::new(AtomicUsize::new(0));
        let payloads = Arc::new(AtomicUsize::new(0));

        let notified_clone = Arc::clone(&notified);
        registry.set(Callback::notify(move || {
            notified_clone.fetch_add(1, Ordering::SeqCst);
        }));
        let payloads_clone = Arc::clone(&payloads);
        registry.set(Callback::payload(move |_| {
            payloads_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(registry.dispatch_notify(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(payloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatch_notify_without_callback() {
        let registry = CallbackRegistry::new();
        registry.set(Callback::payload(|_| {}));
        assert_eq!(registry.dispatch_notify(), 0);
    }

    #[test]
    fn test_clear() {
        let registry = CallbackRegistry::new();
        registry.set(Callback::notify(|| {}));
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.dispatch("x"), 0);
    }

    #[test]
    fn test_callback_may_replace_itself() {
        let registry = Arc::new(CallbackRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let registry_clone = Arc::clone(&registry);
        let hits_clone = Arc::clone(&hits);
        registry.set(Callback::notify(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
            registry_clone.set(Callback::notify(|| {}));
        }));

        registry.dispatch("x");
        registry.dispatch("x");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
