use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Handle returned by every event registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A multicast event.
///
/// Listeners run synchronously on the emitting thread, in subscription
/// order. The listener list is snapshotted before delivery, so a listener
/// may subscribe, unsubscribe or emit again without deadlocking.
pub struct Event<T> {
    listeners: Mutex<Vec<(SubscriptionId, Listener<T>)>>,
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

type OnceListener = Box<dyn FnOnce() + Send>;

enum OnceState {
    Pending(Vec<(SubscriptionId, OnceListener)>),
    Fired,
}

/// An event that fires at most once.
///
/// Every listener runs exactly once: listeners registered before the event
/// fires run when it fires, listeners registered afterwards run immediately.
pub struct OnceEvent {
    state: Mutex<OnceState>,
}

impl OnceEvent {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OnceState::Pending(Vec::new())),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = SubscriptionId::next();
        {
            let mut state = self.state.lock();
            if let OnceState::Pending(listeners) = &mut *state {
                listeners.push((id, Box::new(listener)));
                return id;
            }
        }
        listener();
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match &mut *self.state.lock() {
            OnceState::Pending(listeners) => {
                let before = listeners.len();
                listeners.retain(|(existing, _)| *existing != id);
                listeners.len() != before
            }
            OnceState::Fired => false,
        }
    }

    /// Fire the event. Returns false if it had already fired.
    pub fn fire(&self) -> bool {
        let listeners = match mem::replace(&mut *self.state.lock(), OnceState::Fired) {
            OnceState::Pending(listeners) => listeners,
            OnceState::Fired => return false,
        };
        for (_, listener) in listeners {
            listener();
        }
        true
    }

    pub fn has_fired(&self) -> bool {
        matches!(*self.state.lock(), OnceState::Fired)
    }
}

impl Default for OnceEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OnceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnceEvent")
            .field("fired", &self.has_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn emit_reaches_listeners_in_order() {
        let event = Event::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in [1, 2] {
            let seen = seen.clone();
            event.subscribe(move |value| seen.lock().push((tag, *value)));
        }
        event.emit(&7);

        assert_eq!(*seen.lock(), vec![(1, 7), (2, 7)]);
    }

    #[test]
    fn unsubscribed_listener_is_not_called() {
        let event = Event::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = event.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(event.unsubscribe(id));
        assert!(!event.unsubscribe(id));
        event.emit(&());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_reenter_event() {
        let event = Arc::new(Event::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let inner = event.clone();
        let counter = calls.clone();
        event.subscribe(move |value| {
            counter.fetch_add(1, Ordering::SeqCst);
            if *value > 0 {
                inner.subscribe(|_| {});
                inner.emit(&(value - 1));
            }
        });
        event.emit(&2);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn once_event_fires_each_listener_once() {
        let event = OnceEvent::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        event.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(event.fire());
        assert!(!event.fire());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counter = calls.clone();
        event.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_event_unsubscribe_before_fire() {
        let event = OnceEvent::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = event.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(event.unsubscribe(id));
        event.fire();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(event.has_fired());
    }
}
