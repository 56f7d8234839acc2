//! In-process, synchronous event dispatcher.
//!
//! Deliberately separate from the async [`crate::broker`] / [`crate::realtime`]
//! fan-out: this dispatcher runs handlers inline, in registration order, on
//! the caller's thread, for components within the same process that need to
//! react to orchestrator events without round-tripping through a channel
//! (design §4.3). Do not merge this with the broker — see its module doc.

use crate::serializer::safe_serialize;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// An event as seen by in-process handlers. `payload` is sanitized through
/// [`safe_serialize`] before handlers ever see it, so a misbehaving payload
/// can't make a handler itself unbounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub name: String,
    pub payload: Value,
    pub ts_millis: u64,
}

impl Event {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, payload: Value, ts_millis: u64) -> Self {
        Self { kind: kind.into(), name: name.into(), payload: safe_serialize(&payload), ts_millis }
    }
}

/// Opaque handle returned by [`EventDispatcher::on`], used to unregister a
/// single handler via [`EventDispatcher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: String,
    handler: Handler,
}

/// Synchronous, single-threaded fan-out of events to registered handlers.
/// Handlers run in registration order; a panicking handler is caught and
/// logged so it cannot take down the dispatcher or skip later handlers.
#[derive(Default)]
pub struct EventDispatcher {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events whose `kind` equals `kind`.
    pub fn on<F>(&self, kind: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.lock().push(Subscription { id, kind: kind.into(), handler: Box::new(handler) });
        id
    }

    /// Remove a single handler previously returned by [`Self::on`].
    pub fn off(&self, id: SubscriptionId) {
        self.subscriptions.lock().retain(|s| s.id != id);
    }

    /// Remove every handler registered for `kind`.
    pub fn remove_all(&self, kind: &str) {
        self.subscriptions.lock().retain(|s| s.kind != kind);
    }

    /// Invoke every matching handler, in registration order, on this thread.
    /// A handler that panics is isolated: its panic is caught, logged, and
    /// does not prevent subsequent handlers from running.
    pub fn emit(&self, event: &Event) {
        // Snapshot matching indices under the lock, then call outside it, so a
        // handler calling back into `on`/`off` can't deadlock on its own emit.
        let snapshot: Vec<usize> = {
            let subs = self.subscriptions.lock();
            subs.iter()
                .enumerate()
                .filter(|(_, s)| s.kind == event.kind)
                .map(|(i, _)| i)
                .collect()
        };
        for idx in snapshot {
            let called = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let subs = self.subscriptions.lock();
                if let Some(sub) = subs.get(idx) {
                    (sub.handler)(event);
                }
            }));
            if called.is_err() {
                warn!(kind = %event.kind, name = %event.name, "event handler panicked; isolated");
            }
        }
    }

    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.subscriptions.lock().iter().filter(|s| s.kind == kind).count()
    }
}

/// Convenience registry mapping arbitrary listener keys to dispatchers,
/// useful when multiple independent event buses coexist (e.g. one per
/// service layer). Not required by the base design; kept small.
#[derive(Default)]
pub struct DispatcherGroup {
    dispatchers: Mutex<HashMap<String, Arc<EventDispatcher>>>,
}

impl DispatcherGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, key: &str) -> Arc<EventDispatcher> {
        let mut map = self.dispatchers.lock();
        map.entry(key.to_string()).or_insert_with(|| Arc::new(EventDispatcher::new())).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(kind: &str) -> Event {
        Event::new(kind, "test-event", serde_json::json!({"x": 1}), 0)
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        dispatcher.on("service:started", move |_| o1.lock().push(1));
        dispatcher.on("service:started", move |_| o2.lock().push(2));
        dispatcher.emit(&event("service:started"));
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn only_matching_kind_handlers_fire() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        dispatcher.on("service:started", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.emit(&event("service:stopped"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        dispatcher.emit(&event("service:started"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_a_single_handler() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = dispatcher.on("x", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.off(id);
        dispatcher.emit(&event("x"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_all_clears_every_handler_for_a_kind() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on("x", |_| {});
        dispatcher.on("x", |_| {});
        dispatcher.on("y", |_| {});
        dispatcher.remove_all("x");
        assert_eq!(dispatcher.subscriber_count("x"), 0);
        assert_eq!(dispatcher.subscriber_count("y"), 1);
    }

    #[test]
    fn a_panicking_handler_does_not_stop_later_handlers() {
        let dispatcher = EventDispatcher::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        dispatcher.on("x", |_| panic!("boom"));
        dispatcher.on("x", move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.emit(&event("x"));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
