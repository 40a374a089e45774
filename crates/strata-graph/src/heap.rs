//! The per-thread object heap.
//!
//! Every resident object lives in a [`Slot`] shared by the handles bound to
//! it. The heap keeps three pieces of thread-wide state next to the slots:
//!
//! - the live-object index (`id -> slot`), used to deduplicate loads and to
//!   stop recursion when a record refers back to an object being read,
//! - the root object, which anchors cycle collection,
//! - the "collection in progress" flag, which makes nested releases take
//!   the plain reference-counting path.
//!
//! The heap is thread-local: handles are `!Send`, so a graph never leaves
//! the thread that built it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use strata_types::{ClassId, InstanceId};
use tracing::{debug, trace};

use crate::config::{HeapConfig, RootPolicy};
use crate::handle::Handle;
use crate::object::{Class, Object};

/// Shared storage for one resident object.
pub(crate) struct Slot {
    pub(crate) id: Cell<InstanceId>,
    /// Number of handles bound to this slot.
    pub(crate) refs: Cell<usize>,
    pub(crate) class_id: ClassId,
    pub(crate) class_name: &'static str,
    pub(crate) capabilities: &'static [ClassId],
    /// Cleared once the object has been destroyed.
    pub(crate) alive: Cell<bool>,
    pub(crate) value: RefCell<Option<Box<dyn Object>>>,
}

impl Slot {
    /// Allocate a slot for `value` under `id` and index it.
    pub(crate) fn adopt(value: Box<dyn Object>, id: InstanceId) -> Rc<Slot> {
        let slot = Rc::new(Slot {
            id: Cell::new(id.with_resident(true)),
            refs: Cell::new(0),
            class_id: value.class_id(),
            class_name: value.class_name(),
            capabilities: value.capabilities(),
            alive: Cell::new(true),
            value: RefCell::new(Some(value)),
        });
        HEAP.with(|heap| heap.insert(&slot));
        slot
    }

    /// Address used as the slot's key in visited sets.
    pub(crate) fn key(slot: &Rc<Slot>) -> usize {
        Rc::as_ptr(slot) as usize
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.id.get()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Returns `true` if the object can be viewed as `T`.
    pub(crate) fn provides<T: Class + ?Sized>(&self) -> bool {
        self.capabilities.contains(&T::static_class_id())
    }
}

struct Heap {
    index: RefCell<HashMap<u32, Weak<Slot>>>,
    root: RefCell<Weak<Slot>>,
    collecting: Cell<bool>,
    /// Releases whose scan hit a borrowed object, retried later.
    pending: RefCell<Vec<Weak<Slot>>>,
    config: Cell<HeapConfig>,
}

thread_local! {
    static HEAP: Heap = Heap {
        index: RefCell::new(HashMap::new()),
        root: RefCell::new(Weak::new()),
        collecting: Cell::new(false),
        pending: RefCell::new(Vec::new()),
        config: Cell::new(HeapConfig::default()),
    };
}

impl Heap {
    fn insert(&self, slot: &Rc<Slot>) {
        let id = slot.id();
        if id.is_valid() {
            self.index
                .borrow_mut()
                .insert(id.id(), Rc::downgrade(slot));
        }
        if self.config.get().root_policy == RootPolicy::FirstObject && !self.has_root() {
            *self.root.borrow_mut() = Rc::downgrade(slot);
            debug!(id = %id, class = slot.class_name, "object became heap root");
        }
        trace!(id = %id, class = slot.class_name, "object resident");
    }

    fn has_root(&self) -> bool {
        self.root
            .borrow()
            .upgrade()
            .is_some_and(|slot| slot.is_alive())
    }

    fn find(&self, id: InstanceId) -> Option<Rc<Slot>> {
        self.index
            .borrow()
            .get(&id.id())
            .and_then(Weak::upgrade)
            .filter(|slot| slot.is_alive())
    }

    /// Drop the index entry for `slot`, if the entry still points at it.
    fn forget(&self, slot: &Rc<Slot>) {
        let id = slot.id().id();
        let mut index = self.index.borrow_mut();
        if index
            .get(&id)
            .is_some_and(|weak| Weak::as_ptr(weak) == Rc::as_ptr(slot))
        {
            index.remove(&id);
        }
        drop(index);

        let mut root = self.root.borrow_mut();
        if Weak::as_ptr(&root) == Rc::as_ptr(slot) {
            *root = Weak::new();
            debug!(id = %slot.id(), "heap root destroyed");
        }
    }
}

// ---------------------------------------------------------------------------
// Crate-internal plumbing
// ---------------------------------------------------------------------------

/// Look up a live slot by id.
pub(crate) fn lookup(id: InstanceId) -> Option<Rc<Slot>> {
    HEAP.with(|heap| heap.find(id))
}

/// Change a slot's id, moving its index entry.
pub(crate) fn rekey(slot: &Rc<Slot>, id: u32) {
    HEAP.with(|heap| {
        let mut index = heap.index.borrow_mut();
        let old = slot.id();
        if index
            .get(&old.id())
            .is_some_and(|weak| Weak::as_ptr(weak) == Rc::as_ptr(slot))
        {
            index.remove(&old.id());
        }
        let mut new = old;
        new.set_id(id);
        InstanceId::observe(id);
        slot.id.set(new);
        if new.is_valid() {
            index.insert(id, Rc::downgrade(slot));
        }
    });
}

/// Remove a destroyed slot from the index and the root.
///
/// Silently does nothing once the thread-local has been torn down.
pub(crate) fn forget(slot: &Rc<Slot>) {
    let _ = HEAP.try_with(|heap| heap.forget(slot));
}

/// The current root slot, if it is alive.
pub(crate) fn root_slot() -> Option<Rc<Slot>> {
    HEAP.try_with(|heap| heap.root.borrow().upgrade().filter(|s| s.is_alive()))
        .ok()
        .flatten()
}

/// Every live slot, in id order.
pub(crate) fn live_slots() -> Vec<Rc<Slot>> {
    HEAP.with(|heap| {
        let mut slots: Vec<_> = heap
            .index
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .filter(|slot| slot.is_alive())
            .collect();
        slots.sort_by_key(|slot| slot.id());
        slots
    })
}

/// Queue `slot` for another collection attempt.
pub(crate) fn defer(slot: &Rc<Slot>) {
    let _ = HEAP.try_with(|heap| heap.pending.borrow_mut().push(Rc::downgrade(slot)));
}

pub(crate) fn has_pending() -> bool {
    HEAP.try_with(|heap| !heap.pending.borrow().is_empty())
        .unwrap_or(false)
}

/// Drain the queue, keeping only objects that are still alive.
pub(crate) fn take_pending() -> Vec<Rc<Slot>> {
    HEAP.try_with(|heap| {
        heap.pending
            .take()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|slot| slot.is_alive())
            .collect()
    })
    .unwrap_or_default()
}

/// Returns `true` while a collection or a load is running on this thread.
///
/// `None` once the thread-local has been torn down.
pub(crate) fn is_collecting() -> Option<bool> {
    HEAP.try_with(|heap| heap.collecting.get()).ok()
}

/// Sets the "collection in progress" flag for its lifetime.
///
/// Releases that happen while a guard is alive use plain reference counting.
pub(crate) struct CollectGuard {
    previous: bool,
}

impl CollectGuard {
    pub(crate) fn enter() -> Self {
        let previous = HEAP
            .try_with(|heap| heap.collecting.replace(true))
            .unwrap_or(true);
        Self { previous }
    }
}

impl Drop for CollectGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        let _ = HEAP.try_with(|heap| heap.collecting.set(previous));
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Replace this thread's heap configuration.
pub fn configure(config: HeapConfig) {
    HEAP.with(|heap| heap.config.set(config));
    debug!(?config, "heap configured");
}

/// This thread's heap configuration.
pub fn config() -> HeapConfig {
    HEAP.with(|heap| heap.config.get())
}

/// Number of resident, indexed objects.
pub fn live_count() -> usize {
    HEAP.with(|heap| {
        heap.index
            .borrow()
            .values()
            .filter(|weak| weak.upgrade().is_some_and(|slot| slot.is_alive()))
            .count()
    })
}

/// Returns `true` if an object with `id` is resident.
pub fn is_live(id: InstanceId) -> bool {
    lookup(id).is_some()
}

/// A handle to the resident object with `id`, if there is one.
pub fn find(id: InstanceId) -> Option<Handle<dyn Object>> {
    lookup(id).map(Handle::from_slot)
}

/// Identity of the current root object.
pub fn root_id() -> Option<InstanceId> {
    root_slot().map(|slot| slot.id())
}

/// Make the object behind `handle` the root. A placeholder clears the root.
pub fn set_root<T: Class + ?Sized>(handle: &Handle<T>) {
    let weak = handle.slot().map(Rc::downgrade).unwrap_or_default();
    HEAP.with(|heap| *heap.root.borrow_mut() = weak);
    debug!(id = %handle.id(), "heap root set");
}

/// Forget the root object. With [`RootPolicy::FirstObject`] the next object
/// created becomes the new root.
pub fn clear_root() {
    HEAP.with(|heap| *heap.root.borrow_mut() = Weak::new());
}

pub use crate::collect::collect_garbage;
