//! Same-turn coalescing of fine-grained port and label mutations.
//!
//! The first call for a buffer schedules one flush on the current runtime;
//! every call made before that task runs lands in the same buffer. The flush
//! hands the whole list to the callback supplied by the scheduling call.
//!
//! Coalescing needs a current-thread runtime, where the flush task cannot run
//! until the caller yields. On a multi-thread runtime, or with no runtime at
//! all, every call flushes inline.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, Once, PoisonError},
};

use diagram_model::{EdgeLabel, Port};
use indexmap::IndexMap;
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, trace, warn};

type FlushFn<I> = Arc<dyn Fn(&str, Vec<I>) + Send + Sync>;
type VirtualFlushFn<I> = Arc<dyn Fn(IndexMap<String, Vec<I>>) + Send + Sync>;

struct Pending<I> {
    items: Vec<I>,
    on_flush: FlushFn<I>,
}

struct VirtualPending<I> {
    items: IndexMap<String, Vec<I>>,
    on_flush: VirtualFlushFn<I>,
}

struct Buffers<T> {
    add: HashMap<String, Pending<T>>,
    update: HashMap<String, Pending<T>>,
    delete: HashMap<String, Pending<String>>,
    virtual_add: Option<VirtualPending<T>>,
    virtual_update: Option<VirtualPending<T>>,
    virtual_delete: Option<VirtualPending<String>>,
}

impl<T> Default for Buffers<T> {
    fn default() -> Self {
        Self {
            add: HashMap::new(),
            update: HashMap::new(),
            delete: HashMap::new(),
            virtual_add: None,
            virtual_update: None,
            virtual_delete: None,
        }
    }
}

type OwnerSlot<T, I> = fn(&mut Buffers<T>) -> &mut HashMap<String, Pending<I>>;
type VirtualSlot<T, I> = fn(&mut Buffers<T>) -> &mut Option<VirtualPending<I>>;

pub struct BatchProcessor<T> {
    buffers: Arc<Mutex<Buffers<T>>>,
}

pub type PortBatchProcessor = BatchProcessor<Port>;
pub type LabelBatchProcessor = BatchProcessor<EdgeLabel>;

impl<T> Clone for BatchProcessor<T> {
    fn clone(&self) -> Self {
        Self {
            buffers: Arc::clone(&self.buffers),
        }
    }
}

impl<T: Send + 'static> Default for BatchProcessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> BatchProcessor<T> {
    pub fn new() -> Self {
        Self {
            buffers: Arc::new(Mutex::new(Buffers::default())),
        }
    }

    pub fn process_add<F>(&self, owner: &str, item: T, on_flush: F)
    where
        F: Fn(&str, Vec<T>) + Send + Sync + 'static,
    {
        self.enqueue(|buffers| &mut buffers.add, owner, item, Arc::new(on_flush));
    }

    pub fn process_update<F>(&self, owner: &str, item: T, on_flush: F)
    where
        F: Fn(&str, Vec<T>) + Send + Sync + 'static,
    {
        self.enqueue(|buffers| &mut buffers.update, owner, item, Arc::new(on_flush));
    }

    pub fn process_delete<F>(&self, owner: &str, id: impl Into<String>, on_flush: F)
    where
        F: Fn(&str, Vec<String>) + Send + Sync + 'static,
    {
        self.enqueue(|buffers| &mut buffers.delete, owner, id.into(), Arc::new(on_flush));
    }

    /// Buffers across owners; the flush receives every owner with activity,
    /// in the order owners first appeared.
    pub fn process_add_virtualized<F>(&self, owner: &str, item: T, on_flush: F)
    where
        F: Fn(IndexMap<String, Vec<T>>) + Send + Sync + 'static,
    {
        self.enqueue_virtual(|buffers| &mut buffers.virtual_add, owner, item, Arc::new(on_flush));
    }

    pub fn process_update_virtualized<F>(&self, owner: &str, item: T, on_flush: F)
    where
        F: Fn(IndexMap<String, Vec<T>>) + Send + Sync + 'static,
    {
        self.enqueue_virtual(
            |buffers| &mut buffers.virtual_update,
            owner,
            item,
            Arc::new(on_flush),
        );
    }

    pub fn process_delete_virtualized<F>(&self, owner: &str, id: impl Into<String>, on_flush: F)
    where
        F: Fn(IndexMap<String, Vec<String>>) + Send + Sync + 'static,
    {
        self.enqueue_virtual(
            |buffers| &mut buffers.virtual_delete,
            owner,
            id.into(),
            Arc::new(on_flush),
        );
    }

    /// Owners with items waiting in a per-owner buffer.
    pub fn pending_owner_count(&self) -> usize {
        let buffers = self.buffers();
        buffers
            .add
            .keys()
            .chain(buffers.update.keys())
            .chain(buffers.delete.keys())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn has_pending(&self) -> bool {
        let buffers = self.buffers();
        !buffers.add.is_empty()
            || !buffers.update.is_empty()
            || !buffers.delete.is_empty()
            || buffers.virtual_add.is_some()
            || buffers.virtual_update.is_some()
            || buffers.virtual_delete.is_some()
    }

    /// Drops everything buffered. Flushes already scheduled find nothing to deliver.
    pub fn clear(&self) {
        *self.buffers() = Buffers::default();
    }

    fn enqueue<I: Send + 'static>(
        &self,
        slot: OwnerSlot<T, I>,
        owner: &str,
        item: I,
        on_flush: FlushFn<I>,
    ) {
        let first = {
            let mut buffers = self.buffers();
            let pending = slot(&mut *buffers);
            match pending.get_mut(owner) {
                Some(existing) => {
                    existing.items.push(item);
                    false
                }
                None => {
                    pending.insert(
                        owner.to_string(),
                        Pending {
                            items: vec![item],
                            on_flush,
                        },
                    );
                    true
                }
            }
        };
        if !first {
            return;
        }

        let buffers = Arc::clone(&self.buffers);
        let owner = owner.to_string();
        schedule(move || {
            let pending = slot(&mut *lock(&buffers)).remove(&owner);
            if let Some(pending) = pending {
                trace!(%owner, items = pending.items.len(), "flushing batch");
                (pending.on_flush)(&owner, pending.items);
            }
        });
    }

    fn enqueue_virtual<I: Send + 'static>(
        &self,
        slot: VirtualSlot<T, I>,
        owner: &str,
        item: I,
        on_flush: VirtualFlushFn<I>,
    ) {
        let first = {
            let mut buffers = self.buffers();
            let pending = slot(&mut *buffers);
            let first = pending.is_none();
            pending
                .get_or_insert_with(|| VirtualPending {
                    items: IndexMap::new(),
                    on_flush,
                })
                .items
                .entry(owner.to_string())
                .or_default()
                .push(item);
            first
        };
        if !first {
            return;
        }

        let buffers = Arc::clone(&self.buffers);
        schedule(move || {
            let pending = slot(&mut *lock(&buffers)).take();
            if let Some(pending) = pending {
                trace!(owners = pending.items.len(), "flushing virtualized batch");
                (pending.on_flush)(pending.items);
            }
        });
    }

    fn buffers(&self) -> MutexGuard<'_, Buffers<T>> {
        lock(&self.buffers)
    }
}

static MULTI_THREAD_NOTICE: Once = Once::new();

fn lock<T>(buffers: &Arc<Mutex<Buffers<T>>>) -> MutexGuard<'_, Buffers<T>> {
    buffers.lock().unwrap_or_else(PoisonError::into_inner)
}

fn schedule(flush: impl FnOnce() + Send + 'static) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) if runtime.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            runtime.spawn(async move { flush() });
        }
        Ok(_) => {
            MULTI_THREAD_NOTICE.call_once(|| {
                warn!("[BatchProcessor] multi-thread runtime; batches flush inline without coalescing");
            });
            flush();
        }
        Err(_) => {
            debug!("[BatchProcessor] no async runtime; flushing inline");
            flush();
        }
    }
}

#[cfg(test)]
#[path = "tests/batch_tests.rs"]
mod tests;
