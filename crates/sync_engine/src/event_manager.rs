//! Per-diagram publish/subscribe bus with immediate and deferred delivery.
//!
//! Listeners for one [`EventKind`] run in registration order over a snapshot
//! of the container, so callbacks may subscribe, unsubscribe or emit while a
//! dispatch is in flight. A listener removed mid-dispatch that has not been
//! reached yet is skipped; one added mid-dispatch waits for the next emit.

use std::{
    any::Any,
    collections::{HashMap, VecDeque},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use diagram_model::{DiagramEvent, EventKind};
use tracing::{error, trace};

type ListenerFn = dyn Fn(&DiagramEvent) -> anyhow::Result<()> + Send + Sync;

struct ListenerEntry {
    id: u64,
    once: bool,
    active: AtomicBool,
    fired: AtomicBool,
    callback: Arc<ListenerFn>,
}

impl ListenerEntry {
    fn label(&self) -> &'static str {
        if self.once {
            "once"
        } else {
            "on"
        }
    }
}

struct DeferredEntry {
    origin: Option<u64>,
    event: DiagramEvent,
}

#[derive(Default)]
struct Registry {
    next_listener_id: u64,
    listeners: HashMap<EventKind, Vec<Arc<ListenerEntry>>>,
    deferred: VecDeque<DeferredEntry>,
}

impl Registry {
    fn remove_where(&mut self, kind: EventKind, predicate: impl Fn(&ListenerEntry) -> bool) {
        let Some(entries) = self.listeners.get_mut(&kind) else {
            return;
        };
        entries.retain(|entry| {
            if predicate(entry) {
                entry.active.store(false, Ordering::Release);
                false
            } else {
                true
            }
        });
        if entries.is_empty() {
            self.listeners.remove(&kind);
        }
    }
}

struct Inner {
    enabled: AtomicBool,
    registry: Mutex<Registry>,
}

/// Cheap to clone; every clone talks to the same bus.
#[derive(Clone)]
pub struct EventManager {
    inner: Arc<Inner>,
    origin: Option<u64>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                enabled: AtomicBool::new(true),
                registry: Mutex::new(Registry::default()),
            }),
            origin: None,
        }
    }

    /// A handle on the same bus whose deferred events are tagged with
    /// `transaction`, so they can be rolled back without touching anything
    /// else in the queue.
    pub(crate) fn scoped(&self, transaction: u64) -> EventManager {
        EventManager {
            inner: Arc::clone(&self.inner),
            origin: Some(transaction),
        }
    }

    pub fn on<F>(&self, kind: EventKind, callback: F) -> Unsubscribe
    where
        F: Fn(&DiagramEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(kind, false, Arc::new(callback))
    }

    pub fn once<F>(&self, kind: EventKind, callback: F) -> Unsubscribe
    where
        F: Fn(&DiagramEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(kind, true, Arc::new(callback))
    }

    fn subscribe(&self, kind: EventKind, once: bool, callback: Arc<ListenerFn>) -> Unsubscribe {
        let mut registry = self.registry();
        registry.next_listener_id += 1;
        let id = registry.next_listener_id;
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push(Arc::new(ListenerEntry {
                id,
                once,
                active: AtomicBool::new(true),
                fired: AtomicBool::new(false),
                callback,
            }));

        Unsubscribe {
            manager: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Drops every listener registered for `kind`.
    pub fn off(&self, kind: EventKind) {
        self.registry().remove_where(kind, |_| true);
    }

    pub fn clear_listeners(&self) {
        let mut registry = self.registry();
        for entry in registry.listeners.values().flatten() {
            entry.active.store(false, Ordering::Release);
        }
        registry.listeners.clear();
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.registry().listeners.contains_key(&kind)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry().listeners.get(&kind).map_or(0, Vec::len)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Synchronously delivers `event` to its listeners. Listener failures are
    /// logged and never reach the caller.
    pub fn emit(&self, event: DiagramEvent) {
        self.dispatch(&event);
    }

    /// Queues `event` for the next [`flush_deferred_emits`](Self::flush_deferred_emits).
    /// Events are dropped, not buffered, while the bus is disabled.
    pub fn deferred_emit(&self, event: DiagramEvent) {
        if !self.is_enabled() {
            return;
        }
        self.registry().deferred.push_back(DeferredEntry {
            origin: self.origin,
            event,
        });
    }

    /// Emits everything queued so far, in enqueue order. Events queued by a
    /// listener during the flush stay queued for the next flush.
    pub fn flush_deferred_emits(&self) {
        let batch: Vec<DeferredEntry> = self.registry().deferred.drain(..).collect();
        if batch.is_empty() {
            return;
        }
        trace!(count = batch.len(), "flushing deferred events");
        for entry in batch {
            self.dispatch(&entry.event);
        }
    }

    pub fn clear_deferred_emits(&self) {
        self.registry().deferred.clear();
    }

    pub fn pending_deferred_count(&self) -> usize {
        self.registry().deferred.len()
    }

    /// Discards the deferred events queued through [`scoped`](Self::scoped)
    /// handles for `transaction`. Everything else stays queued.
    pub(crate) fn rollback_deferred(&self, transaction: u64) {
        self.registry()
            .deferred
            .retain(|entry| entry.origin != Some(transaction));
    }

    fn dispatch(&self, event: &DiagramEvent) {
        if !self.is_enabled() {
            return;
        }
        let kind = event.kind();
        let snapshot = match self.registry().listeners.get(&kind) {
            Some(entries) => entries.clone(),
            None => return,
        };
        trace!(event = %kind, listeners = snapshot.len(), "emitting");

        let mut fired_once = false;
        for entry in &snapshot {
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            if entry.once {
                if entry.fired.swap(true, Ordering::AcqRel) {
                    continue;
                }
                fired_once = true;
            }
            invoke(kind, entry, event);
        }

        if fired_once {
            self.registry()
                .remove_where(kind, |entry| entry.once && entry.fired.load(Ordering::Acquire));
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        lock_registry(&self.inner)
    }
}

fn lock_registry(inner: &Inner) -> MutexGuard<'_, Registry> {
    inner
        .registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn invoke(kind: EventKind, entry: &ListenerEntry, event: &DiagramEvent) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(event)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(
                event = %kind,
                listener = entry.label(),
                error = %format!("{err:#}"),
                "[EventManager] listener failed"
            );
        }
        Err(payload) => {
            error!(
                event = %kind,
                listener = entry.label(),
                panic = panic_message(&*payload),
                "[EventManager] listener panicked"
            );
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle returned by [`EventManager::on`] / [`EventManager::once`].
/// Calling [`unsubscribe`](Self::unsubscribe) more than once is a no-op;
/// dropping the handle keeps the listener registered.
#[derive(Clone)]
pub struct Unsubscribe {
    manager: Weak<Inner>,
    kind: EventKind,
    id: u64,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        let Some(inner) = self.manager.upgrade() else {
            return;
        };
        let id = self.id;
        lock_registry(&inner).remove_where(self.kind, |entry| entry.id == id);
    }
}

#[cfg(test)]
#[path = "tests/event_manager_tests.rs"]
mod tests;
