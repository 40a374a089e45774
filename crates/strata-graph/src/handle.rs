//! The owning handle.
//!
//! A [`Handle<T>`] is either bound to a resident object or empty. An empty
//! handle still carries an [`InstanceId`]: a placeholder for an object that
//! lives in the store and can be brought back with [`Handle::load`].
//!
//! Every bound handle contributes one to its object's reference count.
//! Dropping the last handle to an object destroys it; dropping a handle into
//! a cycle that is no longer reachable destroys the whole cycle (see
//! [`collect`](crate::collect)).

use std::cell::{Ref, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use strata_store::StoreResult;
use strata_types::{ClassId, InstanceId, RecordReader, RecordWriter};
use tracing::debug;

use crate::collect;
use crate::context::Context;
use crate::error::GraphResult;
use crate::heap::{CollectGuard, Slot};
use crate::object::{cast_mut, cast_ref, Class, Object};
use crate::protocol;

enum State {
    Bound(Rc<Slot>),
    Empty(InstanceId),
}

/// A typed, reference-counted handle to a persistable object.
///
/// `T` is a concrete object type or a capability (`dyn Object`, or any
/// trait declared with [`capability!`](crate::capability!)).
pub struct Handle<T: Class + ?Sized = dyn Object> {
    state: State,
    _marker: PhantomData<*const T>,
}

impl<T: Object + Class> Handle<T> {
    /// Place `value` on the heap under a fresh identity.
    pub fn new(value: T) -> Self {
        Self::from_slot(Slot::adopt(Box::new(value), InstanceId::generate()))
    }
}

impl Handle<dyn Object> {
    /// Place an already boxed object on the heap under a fresh identity.
    pub fn from_object(value: Box<dyn Object>) -> Self {
        Self::from_slot(Slot::adopt(value, InstanceId::generate()))
    }
}

impl<T: Class + ?Sized> Handle<T> {
    /// An empty handle with no identity.
    pub fn empty() -> Self {
        Self::placeholder(InstanceId::INVALID)
    }

    /// An empty handle standing in for the stored object `id`.
    pub fn placeholder(id: InstanceId) -> Self {
        Self {
            state: State::Empty(id),
            _marker: PhantomData,
        }
    }

    /// Bind a new handle to `slot`. The caller guarantees `slot` provides `T`.
    pub(crate) fn from_slot(slot: Rc<Slot>) -> Self {
        slot.refs.set(slot.refs.get() + 1);
        Self {
            state: State::Bound(slot),
            _marker: PhantomData,
        }
    }

    pub(crate) fn slot(&self) -> Option<&Rc<Slot>> {
        match &self.state {
            State::Bound(slot) => Some(slot),
            State::Empty(_) => None,
        }
    }

    /// Move the state into a handle of another type without touching the
    /// reference count.
    fn retype<U: Class + ?Sized>(mut self) -> Handle<U> {
        let state = mem::replace(&mut self.state, State::Empty(InstanceId::INVALID));
        Handle {
            state,
            _marker: PhantomData,
        }
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    /// Returns `true` if the handle is bound to a resident object.
    pub fn is_bound(&self) -> bool {
        matches!(self.state, State::Bound(_))
    }

    /// Returns `true` if the handle is a placeholder.
    pub fn is_empty(&self) -> bool {
        !self.is_bound()
    }

    /// Borrow the object, or `None` for a placeholder.
    ///
    /// # Panics
    ///
    /// Panics if the object is currently mutably borrowed.
    pub fn get(&self) -> Option<Ref<'_, T>> {
        let slot = self.slot()?;
        let value = slot.value.borrow();
        Ref::filter_map(value, |value| {
            value.as_deref().and_then(|object| cast_ref::<T>(object))
        })
        .ok()
    }

    /// Mutably borrow the object, or `None` for a placeholder.
    ///
    /// # Panics
    ///
    /// Panics if the object is currently borrowed.
    pub fn get_mut(&self) -> Option<ObjectMut<'_, T>> {
        let slot = self.slot()?;
        let value = slot.value.borrow_mut();
        RefMut::filter_map(value, |value| {
            value.as_deref_mut().and_then(|object| cast_mut::<T>(object))
        })
        .ok()
        .map(|inner| ObjectMut {
            inner: ManuallyDrop::new(inner),
        })
    }

    /// Borrow the object.
    ///
    /// # Panics
    ///
    /// Panics if the handle is a placeholder. Check [`is_bound`](Self::is_bound)
    /// first, or use [`get`](Self::get).
    pub fn borrow(&self) -> Ref<'_, T> {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced empty handle {:?}", self.identity()),
        }
    }

    /// Mutably borrow the object.
    ///
    /// # Panics
    ///
    /// Panics if the handle is a placeholder.
    pub fn borrow_mut(&self) -> ObjectMut<'_, T> {
        match self.get_mut() {
            Some(value) => value,
            None => panic!("dereferenced empty handle {:?}", self.identity()),
        }
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// The full identity, including the residency flag.
    pub fn identity(&self) -> InstanceId {
        match &self.state {
            State::Bound(slot) => slot.id(),
            State::Empty(id) => *id,
        }
    }

    /// Same as [`identity`](Self::identity); equality ignores the flag.
    pub fn id(&self) -> InstanceId {
        self.identity()
    }

    /// Change the numeric id. For a resident object the live index follows.
    pub fn set_id(&mut self, id: u32) {
        match &mut self.state {
            State::Bound(slot) => crate::heap::rekey(slot, id),
            State::Empty(current) => current.set_id(id),
        }
    }

    /// The residency flag.
    pub fn is_resident(&self) -> bool {
        self.identity().is_resident()
    }

    /// Set or clear the residency flag.
    pub fn set_resident(&mut self, resident: bool) {
        match &mut self.state {
            State::Bound(slot) => slot.id.set(slot.id().with_resident(resident)),
            State::Empty(current) => current.set_resident(resident),
        }
    }

    /// The concrete class of the bound object, or the root class for a
    /// placeholder.
    pub fn class_id(&self) -> ClassId {
        match &self.state {
            State::Bound(slot) => slot.class_id,
            State::Empty(_) => ClassId::root(),
        }
    }

    /// The concrete class name, or `None` for a placeholder.
    pub fn class_name(&self) -> Option<&'static str> {
        self.slot().map(|slot| slot.class_name)
    }

    /// Number of handles bound to the object. Zero for a placeholder.
    pub fn ref_count(&self) -> usize {
        self.slot().map_or(0, |slot| slot.refs.get())
    }

    /// Returns `true` if both handles are bound to the same object,
    /// whatever their declared types.
    pub fn ptr_eq<U: Class + ?Sized>(&self, other: &Handle<U>) -> bool {
        match (self.slot(), other.slot()) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Conversion
    // -----------------------------------------------------------------------

    /// A handle to the same object viewed as `U`.
    ///
    /// Yields an empty handle if the object does not provide `U`. A
    /// placeholder converts to a placeholder with the same identity; the
    /// capability is checked when it is loaded.
    pub fn cast<U: Class + ?Sized>(&self) -> Handle<U> {
        match &self.state {
            State::Bound(slot) if slot.provides::<U>() => Handle::from_slot(Rc::clone(slot)),
            State::Bound(_) => Handle::empty(),
            State::Empty(id) => Handle::placeholder(*id),
        }
    }

    /// Consuming form of [`cast`](Self::cast).
    pub fn into_cast<U: Class + ?Sized>(self) -> Handle<U> {
        let compatible = self.slot().map_or(true, |slot| slot.provides::<U>());
        if compatible {
            self.retype()
        } else {
            Handle::empty()
        }
    }

    /// A handle to the same object viewed as `dyn Object`.
    pub fn upcast(&self) -> Handle<dyn Object> {
        match &self.state {
            State::Bound(slot) => Handle::from_slot(Rc::clone(slot)),
            State::Empty(id) => Handle::placeholder(*id),
        }
    }

    /// Consuming form of [`upcast`](Self::upcast).
    pub fn into_upcast(self) -> Handle<dyn Object> {
        self.retype()
    }

    /// Rebind to the object behind `other`.
    ///
    /// Does nothing if both handles already refer to the same object.
    pub fn assign(&mut self, other: &Self) {
        self.assign_from(other);
    }

    /// Rebind to the object behind `other`, cast to `T`.
    ///
    /// Does nothing if both handles already refer to the same object. If the
    /// object does not provide `T`, this handle becomes empty.
    pub fn assign_from<U: Class + ?Sized>(&mut self, other: &Handle<U>) {
        if self.ptr_eq(other) {
            return;
        }
        *self = other.cast();
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the subgraph reachable from this handle through `store`.
    ///
    /// Every resident object is stored once, under its id's decimal key.
    /// A failing `store` aborts the walk; records already written stay
    /// written.
    pub fn serialize<S>(&self, store: S) -> GraphResult<()>
    where
        S: FnMut(&str, &[u8]) -> StoreResult<()>,
    {
        let mut ctx = Context::with_store(store);
        let mut out = RecordWriter::new();
        protocol::serialize(&mut ctx, &mut out, self)?;
        debug!(
            id = %self.identity(),
            records = ctx.records_written(),
            "graph serialized"
        );
        Ok(())
    }

    /// Bring a placeholder's object into memory through `load`.
    ///
    /// Does nothing if the handle is already bound or has no identity.
    /// Objects that are already resident are reused rather than loaded again.
    /// On failure the handle is left as it was and every object the load
    /// constructed is destroyed.
    pub fn load<L>(&mut self, load: L) -> GraphResult<()>
    where
        L: FnMut(&str) -> StoreResult<Vec<u8>>,
    {
        let id = match self.state {
            State::Empty(id) if id.is_valid() => id,
            _ => return Ok(()),
        };

        let mut record = RecordWriter::new();
        record.write_instance(id.with_resident(true))?;
        let mut input = RecordReader::new(record.into_bytes());

        let _guard = CollectGuard::enter();
        let mut ctx = Context::with_load(load);
        let loaded = protocol::deserialize_as::<T>(&mut ctx, &mut input)?;
        debug!(id = %id, records = ctx.records_loaded(), "graph loaded");
        *self = loaded;
        Ok(())
    }

    /// Drop the reference to the resident object, keeping its identity.
    ///
    /// The handle becomes an unresident placeholder that [`load`](Self::load)
    /// can bring back. Other handles may keep the object alive.
    pub fn unload(&mut self) {
        if let State::Bound(slot) = &self.state {
            let id = slot.id().with_resident(false);
            *self = Self::placeholder(id);
        }
    }

    /// Copy the object by persistence.
    ///
    /// Copy semantics for resident objects are not defined yet; this always
    /// returns an empty handle.
    pub fn clone_object(&self) -> Self {
        debug!(id = %self.identity(), "clone_object is not supported, returning empty handle");
        Self::empty()
    }
}

/// A mutable borrow of a handle's object.
///
/// Cycle collection triggered by handles released while the borrow was held
/// runs when the borrow ends.
pub struct ObjectMut<'a, T: ?Sized> {
    inner: ManuallyDrop<RefMut<'a, T>>,
}

impl<T: ?Sized> Deref for ObjectMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> DerefMut for ObjectMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: ?Sized> Drop for ObjectMut<'_, T> {
    fn drop(&mut self) {
        // SAFETY: `inner` is dropped exactly once, here, and never used again.
        unsafe { ManuallyDrop::drop(&mut self.inner) };
        collect::collect_pending();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ObjectMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: Object + Class> From<T> for Handle<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Class + ?Sized> Default for Handle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Class + ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        match &self.state {
            State::Bound(slot) => Self::from_slot(Rc::clone(slot)),
            State::Empty(id) => Self::placeholder(*id),
        }
    }
}

impl<T: Class + ?Sized> Drop for Handle<T> {
    fn drop(&mut self) {
        if let State::Bound(slot) = mem::replace(&mut self.state, State::Empty(InstanceId::INVALID))
        {
            collect::release(&slot);
        }
    }
}

/// Bound handles are equal when they share an object. Placeholders are
/// equal when they stand for the same stored object; a placeholder without
/// an identity equals nothing, itself included.
impl<T: Class + ?Sized, U: Class + ?Sized> PartialEq<Handle<U>> for Handle<T> {
    fn eq(&self, other: &Handle<U>) -> bool {
        match (&self.state, &other.state) {
            (State::Bound(a), State::Bound(b)) => Rc::ptr_eq(a, b),
            (State::Empty(a), State::Empty(b)) => a.is_valid() && a == b,
            _ => false,
        }
    }
}

impl<T: Class + ?Sized> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Bound(slot) => f
                .debug_struct("Handle")
                .field("id", &slot.id())
                .field("class", &slot.class_name)
                .field("refs", &slot.refs.get())
                .finish(),
            State::Empty(id) => f
                .debug_struct("Handle")
                .field("id", id)
                .field("empty", &true)
                .finish(),
        }
    }
}
