//! Event subscriptions
//!
//! Handlers are registered per event name and called synchronously, in
//! registration order, on the shard task that decoded the event. `once`
//! handlers for a name run before its regular handlers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;

use super::GatewayEvent;

/// Event handler callback
pub type EventHandler = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    once: Vec<(u64, EventHandler)>,
    regular: Vec<(u64, EventHandler)>,
}

impl Subscribers {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.once.len() + self.regular.len();
        self.once.retain(|(sid, _)| *sid != id);
        self.regular.retain(|(sid, _)| *sid != id);
        before != self.once.len() + self.regular.len()
    }

    fn is_empty(&self) -> bool {
        self.once.is_empty() && self.regular.is_empty()
    }
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<String, Subscribers>>,
}

impl RegistryInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn remove(&self, name: &str, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(entry) = subscribers.get_mut(name) else {
            return false;
        };
        let removed = entry.remove(id);
        if entry.is_empty() {
            subscribers.remove(name);
        }
        removed
    }
}

/// Registry of event handlers keyed by event name
///
/// Cloning is cheap; clones share the same handlers.
#[derive(Clone, Default)]
pub struct EventRegistry {
    inner: Arc<RegistryInner>,
}

impl EventRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event named `name`
    pub fn on<F>(&self, name: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.subscribe(name, Arc::new(handler))
    }

    /// Subscribe with a shared handler
    pub fn subscribe(&self, name: impl Into<String>, handler: EventHandler) -> SubscriptionHandle {
        let name = name.into();
        let id = self.inner.next_id();
        self.inner
            .subscribers
            .lock()
            .entry(name.clone())
            .or_default()
            .regular
            .push((id, handler));
        self.handle(name, id)
    }

    /// Subscribe to the next event named `name` only
    pub fn once<F>(&self, name: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let id = self.inner.next_id();
        self.inner
            .subscribers
            .lock()
            .entry(name.clone())
            .or_default()
            .once
            .push((id, Arc::new(handler)));
        self.handle(name, id)
    }

    /// Replace every handler of `name` with `handler`
    pub fn replace<F>(&self, name: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let id = self.inner.next_id();
        let handler: EventHandler = Arc::new(handler);
        self.inner.subscribers.lock().insert(
            name.clone(),
            Subscribers {
                once: Vec::new(),
                regular: vec![(id, handler)],
            },
        );
        self.handle(name, id)
    }

    /// Wait for the first event named `name` that matches `predicate`
    ///
    /// Returns `None` on timeout.
    pub async fn wait_for<P>(
        &self,
        name: impl Into<String>,
        predicate: P,
        timeout: Duration,
    ) -> Option<GatewayEvent>
    where
        P: Fn(&GatewayEvent) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let handle = self.on(name, move |event| {
            if predicate(event) {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(event.clone());
                }
            }
        });

        let result = tokio::time::timeout(timeout, rx).await;
        handle.remove();
        result.ok().and_then(Result::ok)
    }

    /// Call the handlers of `event.name`
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe while running.
    pub fn emit(&self, event: &GatewayEvent) -> usize {
        let (once, regular) = {
            let mut subscribers = self.inner.subscribers.lock();
            let Some(entry) = subscribers.get_mut(&event.name) else {
                return 0;
            };
            let once = std::mem::take(&mut entry.once);
            let regular: Vec<EventHandler> =
                entry.regular.iter().map(|(_, h)| Arc::clone(h)).collect();
            if entry.is_empty() {
                subscribers.remove(&event.name);
            }
            (once, regular)
        };

        let count = once.len() + regular.len();
        for (_, handler) in once {
            handler(event);
        }
        for handler in regular {
            handler(event);
        }
        count
    }

    /// Number of handlers registered for `name`
    pub fn handler_count(&self, name: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(name)
            .map_or(0, |entry| entry.once.len() + entry.regular.len())
    }

    /// Remove every handler
    pub fn clear(&self) {
        self.inner.subscribers.lock().clear();
    }

    fn handle(&self, name: String, id: u64) -> SubscriptionHandle {
        SubscriptionHandle {
            name,
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.inner.subscribers.lock().len();
        f.debug_struct("EventRegistry")
            .field("event_names", &names)
            .finish()
    }
}

/// Handle to a registered handler
///
/// Dropping the handle keeps the handler registered; call
/// [`remove`](Self::remove) to unsubscribe.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    name: String,
    id: u64,
    registry: Weak<RegistryInner>,
}

impl SubscriptionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unsubscribe
    ///
    /// Returns false if the handler was already gone (a fired `once`, a
    /// `replace`, or a dropped registry).
    pub fn remove(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.remove(&self.name, self.id))
    }
}
