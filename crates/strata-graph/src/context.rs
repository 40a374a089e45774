//! Per-operation state for graph traversal.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use strata_store::StoreResult;
use tracing::trace;

use crate::error::{GraphError, GraphResult};
use crate::handle::Handle;
use crate::heap::Slot;
use crate::object::Class;

/// "Store bytes under a key".
pub type StoreFn<'f> = Box<dyn FnMut(&str, &[u8]) -> StoreResult<()> + 'f>;

/// "Load bytes for a key".
pub type LoadFn<'f> = Box<dyn FnMut(&str) -> StoreResult<Vec<u8>> + 'f>;

/// Transient state for one serialize, load, or reachability pass.
///
/// Holds the store/load facilities and the set of objects already visited,
/// so each object is written or read at most once per pass and cycles
/// terminate. A context is never reused across top-level operations.
pub struct Context<'f> {
    store: Option<StoreFn<'f>>,
    load: Option<LoadFn<'f>>,
    /// Reachability pass: records are built but not stored.
    scanning: bool,
    visited: HashMap<usize, Rc<Slot>>,
    /// Handle encounters per object.
    encounters: HashMap<usize, usize>,
    /// Handle edges between visited objects, recorded while scanning.
    edges: HashMap<usize, Vec<usize>>,
    path: Vec<usize>,
    /// Objects constructed from records by this context, in load order.
    created: Vec<Rc<Slot>>,
    records_written: usize,
    records_loaded: usize,
}

impl<'f> Context<'f> {
    fn blank() -> Self {
        Self {
            store: None,
            load: None,
            scanning: false,
            visited: HashMap::new(),
            encounters: HashMap::new(),
            edges: HashMap::new(),
            path: Vec::new(),
            created: Vec::new(),
            records_written: 0,
            records_loaded: 0,
        }
    }

    /// A context for serialization through `store`.
    pub fn with_store<S>(store: S) -> Self
    where
        S: FnMut(&str, &[u8]) -> StoreResult<()> + 'f,
    {
        Self {
            store: Some(Box::new(store)),
            ..Self::blank()
        }
    }

    /// A context for deserialization through `load`.
    pub fn with_load<L>(load: L) -> Self
    where
        L: FnMut(&str) -> StoreResult<Vec<u8>> + 'f,
    {
        Self {
            load: Some(Box::new(load)),
            ..Self::blank()
        }
    }

    /// A context whose store discards everything. Serializing through it
    /// computes the reachable set and per-object handle counts.
    pub(crate) fn scanning() -> Self {
        Self {
            scanning: true,
            ..Self::blank()
        }
    }

    /// Mark the object behind `handle` as visited.
    ///
    /// Returns `true` if it had already been marked. Placeholders are never
    /// marked and always report `false`.
    pub fn mark_visited<T: Class + ?Sized>(&mut self, handle: &Handle<T>) -> bool {
        match handle.slot() {
            Some(slot) => self.mark_slot(slot),
            None => false,
        }
    }

    /// Returns `true` if the object behind `handle` was visited.
    pub fn is_visited<T: Class + ?Sized>(&self, handle: &Handle<T>) -> bool {
        handle
            .slot()
            .is_some_and(|slot| self.visited.contains_key(&Slot::key(slot)))
    }

    /// Number of distinct objects visited so far.
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Records handed to the store facility.
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Records fetched through the load facility.
    pub fn records_loaded(&self) -> usize {
        self.records_loaded
    }

    // -----------------------------------------------------------------------
    // Traversal bookkeeping
    // -----------------------------------------------------------------------

    pub(crate) fn mark_slot(&mut self, slot: &Rc<Slot>) -> bool {
        let key = Slot::key(slot);
        if self.visited.contains_key(&key) {
            return true;
        }
        self.visited.insert(key, Rc::clone(slot));
        false
    }

    /// Count one handle pointing at `slot`, from the object being written.
    pub(crate) fn note_reference(&mut self, slot: &Rc<Slot>) {
        let key = Slot::key(slot);
        *self.encounters.entry(key).or_default() += 1;
        if self.scanning {
            if let Some(&parent) = self.path.last() {
                self.edges.entry(parent).or_default().push(key);
            }
        }
    }

    pub(crate) fn enter(&mut self, slot: &Rc<Slot>) {
        self.path.push(Slot::key(slot));
    }

    pub(crate) fn leave(&mut self) {
        self.path.pop();
    }

    pub(crate) fn encounters(&self, key: usize) -> usize {
        self.encounters.get(&key).copied().unwrap_or(0)
    }

    pub(crate) fn edges(&self, key: usize) -> &[usize] {
        self.edges.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn visited(&self) -> &HashMap<usize, Rc<Slot>> {
        &self.visited
    }

    pub(crate) fn into_visited(self) -> HashMap<usize, Rc<Slot>> {
        self.visited
    }

    pub(crate) fn note_created(&mut self, slot: &Rc<Slot>) {
        self.created.push(Rc::clone(slot));
    }

    pub(crate) fn created_count(&self) -> usize {
        self.created.len()
    }

    /// Remove and return the objects constructed after the first `mark`.
    pub(crate) fn take_created(&mut self, mark: usize) -> Vec<Rc<Slot>> {
        self.created.split_off(mark.min(self.created.len()))
    }

    // -----------------------------------------------------------------------
    // Facilities
    // -----------------------------------------------------------------------

    pub(crate) fn store(&mut self, key: &str, bytes: &[u8]) -> GraphResult<()> {
        if self.scanning {
            return Ok(());
        }
        let store = self.store.as_mut().ok_or(GraphError::NoStoreFacility)?;
        store(key, bytes)?;
        self.records_written += 1;
        trace!(key, len = bytes.len(), "record stored");
        Ok(())
    }

    pub(crate) fn load(&mut self, key: &str) -> GraphResult<Vec<u8>> {
        let load = self.load.as_mut().ok_or(GraphError::NoLoadFacility)?;
        let bytes = load(key)?;
        self.records_loaded += 1;
        trace!(key, len = bytes.len(), "record loaded");
        Ok(bytes)
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("has_store", &self.store.is_some())
            .field("has_load", &self.load.is_some())
            .field("scanning", &self.scanning)
            .field("visited", &self.visited.len())
            .field("created", &self.created.len())
            .field("records_written", &self.records_written)
            .field("records_loaded", &self.records_loaded)
            .finish()
    }
}
