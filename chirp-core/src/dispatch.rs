//! Dispatch registry
//!
//! Handlers are stored per event key in registration order, with a
//! reverse index from owning plugin to its registrations so unloading a
//! plugin removes everything it registered in one pass. Delivery is
//! fire-and-forget: each handler runs as a detached task, so a slow,
//! failing or panicking handler never affects its siblings or the
//! socket loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use chirp_api::{Disposer, EventHandler, EventPayload, HandlerRegistrar};

struct Entry {
    id: u64,
    owner: String,
    handler: EventHandler,
}

#[derive(Default)]
struct Inner {
    handlers: HashMap<String, Vec<Entry>>,
    by_owner: HashMap<String, Vec<(String, u64)>>,
    next_id: u64,
}

impl Inner {
    fn remove_entry(&mut self, key: &str, id: u64) -> bool {
        let Some(entries) = self.handlers.get_mut(key) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        let owner = entries.remove(pos).owner;
        if entries.is_empty() {
            self.handlers.remove(key);
        }
        if let Some(owned) = self.by_owner.get_mut(&owner) {
            owned.retain(|(k, i)| !(k == key && *i == id));
            if owned.is_empty() {
                self.by_owner.remove(&owner);
            }
        }
        true
    }
}

/// Shared handler registry, cloneable like a handle
#[derive(Clone, Default)]
pub struct DispatchRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `key` on behalf of `owner`
    ///
    /// The same callback (by pointer identity) under the same key is
    /// registered at most once; duplicates get an inert disposer. The
    /// returned disposer removes exactly this registration and stays
    /// safe to call after the registry is gone.
    pub fn register(&self, owner: &str, key: &str, handler: EventHandler) -> Disposer {
        let mut inner = self.inner.lock().unwrap();

        if let Some(entries) = inner.handlers.get(key)
            && entries.iter().any(|e| Arc::ptr_eq(&e.handler, &handler))
        {
            tracing::debug!(owner, key, "duplicate handler registration ignored");
            return Disposer::noop();
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.entry(key.to_string()).or_default().push(Entry {
            id,
            owner: owner.to_string(),
            handler,
        });
        inner
            .by_owner
            .entry(owner.to_string())
            .or_default()
            .push((key.to_string(), id));
        tracing::debug!(owner, key, id, "handler registered");

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        let key = key.to_string();
        Disposer::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().unwrap().remove_entry(&key, id);
            }
        })
    }

    /// Deliver `payload` to every handler registered under `key`
    ///
    /// Handlers are snapshotted under the lock and spawned in
    /// registration order; errors are logged per handler.
    pub fn deliver(&self, key: &str, payload: EventPayload) {
        let snapshot: Vec<(String, EventHandler)> = {
            let inner = self.inner.lock().unwrap();
            match inner.handlers.get(key) {
                Some(entries) => entries
                    .iter()
                    .map(|e| (e.owner.clone(), e.handler.clone()))
                    .collect(),
                None => return,
            }
        };

        for (owner, handler) in snapshot {
            let payload = payload.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                if let Err(e) = (handler)(payload).await {
                    tracing::error!(owner = %owner, key = %key, error = %e, "event handler failed");
                }
            });
        }
    }

    /// Remove every registration owned by `owner`; no-op for unknown owners
    pub fn remove_all_for(&self, owner: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let Some(owned) = inner.by_owner.remove(owner) else {
            return 0;
        };
        let count = owned.len();
        for (key, id) in owned {
            if let Some(entries) = inner.handlers.get_mut(&key) {
                entries.retain(|entry| entry.id != id);
                if entries.is_empty() {
                    inner.handlers.remove(&key);
                }
            }
        }
        tracing::debug!(owner, count, "removed handler registrations");
        count
    }

    /// Number of handlers currently registered under `key`
    pub fn handler_count(&self, key: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .handlers
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Total registrations across all keys
    pub fn total_handlers(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .handlers
            .values()
            .map(Vec::len)
            .sum()
    }
}

/// Registrar that attributes every registration to one plugin
pub struct ScopedRegistrar {
    owner: String,
    registry: DispatchRegistry,
}

impl ScopedRegistrar {
    pub fn new(owner: impl Into<String>, registry: DispatchRegistry) -> Self {
        Self {
            owner: owner.into(),
            registry,
        }
    }
}

impl HandlerRegistrar for ScopedRegistrar {
    fn register(&self, key: &str, handler: EventHandler) -> Disposer {
        self.registry.register(&self.owner, key, handler)
    }
}
