//! The class table and its override chain.
//!
//! # Invariants
//!
//! - Class ids are unique in the factory table.
//! - At most one override edge leaves any base id; a newer registration for
//!   the same base replaces the older edge.
//! - No edge is recorded for the root base identifier.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use strata_types::ClassId;
use tracing::{debug, trace};

use crate::error::{RegistryError, RegistryResult};

/// Zero-argument constructor producing a fresh instance of one class.
pub type Factory<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

struct Entry<T: ?Sized> {
    name: String,
    factory: Factory<T>,
}

/// Table mapping class ids to factories, plus override edges.
///
/// `T` is the root of the polymorphic hierarchy (typically a trait object);
/// every factory returns a `Box<T>`.
pub struct ClassRegistry<T: ?Sized> {
    root: ClassId,
    entries: HashMap<ClassId, Entry<T>>,
    /// Override edges: base id -> most recently registered overriding id.
    overrides: HashMap<ClassId, ClassId>,
}

impl<T: ?Sized> ClassRegistry<T> {
    /// Create an empty registry whose root base identifier is [`ClassId::root`].
    pub fn new() -> Self {
        Self::with_root(ClassId::root())
    }

    /// Create an empty registry with a custom root base identifier.
    pub fn with_root(root: ClassId) -> Self {
        Self {
            root,
            entries: HashMap::new(),
            overrides: HashMap::new(),
        }
    }

    /// The root base identifier.
    pub fn root(&self) -> ClassId {
        self.root
    }

    /// Register a factory for `class_id`.
    ///
    /// If `base` is not the root base identifier, an override edge
    /// `base -> class_id` is recorded, so construction requests for `base`
    /// resolve to this class from now on.
    ///
    /// Fails if `class_id` is already registered. Name collisions and hash
    /// collisions are indistinguishable here and both are configuration
    /// errors.
    pub fn register(
        &mut self,
        class_id: ClassId,
        base: ClassId,
        name: impl Into<String>,
        factory: Factory<T>,
    ) -> RegistryResult<()> {
        let name = name.into();
        if let Some(existing) = self.entries.get(&class_id) {
            return Err(RegistryError::DuplicateClass {
                class_id,
                existing: existing.name.clone(),
                name,
            });
        }

        debug!(class = %class_id, name = %name, base = %base, "registered class");
        self.entries.insert(class_id, Entry { name, factory });
        if base != self.root {
            self.overrides.insert(base, class_id);
        }
        Ok(())
    }

    /// Remove a class and every override edge pointing at it.
    ///
    /// Returns `true` if the class was registered.
    pub fn unregister(&mut self, class_id: ClassId) -> bool {
        let existed = self.entries.remove(&class_id).is_some();
        self.overrides.retain(|_, target| *target != class_id);
        if existed {
            debug!(class = %class_id, "unregistered class");
        }
        existed
    }

    /// Follow the override chain from `requested` to the most specific id.
    ///
    /// Stops at the first id without an outgoing edge, at a self-edge, or at
    /// the first id seen twice.
    pub fn resolve(&self, requested: ClassId) -> ClassId {
        let mut current = requested;
        let mut seen = HashSet::new();
        seen.insert(current);
        while let Some(&next) = self.overrides.get(&current) {
            if !seen.insert(next) {
                break;
            }
            trace!(from = %current, to = %next, "following override edge");
            current = next;
        }
        current
    }

    /// Construct an instance for `requested`, honouring overrides.
    ///
    /// Returns `None` if no factory is registered for the resolved id.
    pub fn construct(&self, requested: ClassId) -> Option<Box<T>> {
        let resolved = self.resolve(requested);
        self.entries.get(&resolved).map(|entry| (entry.factory)())
    }

    /// The factory registered for exactly `class_id`, without following
    /// overrides.
    pub fn factory(&self, class_id: ClassId) -> Option<Factory<T>> {
        self.entries.get(&class_id).map(|entry| Arc::clone(&entry.factory))
    }

    /// Returns `true` if a factory is registered for exactly `class_id`.
    pub fn contains(&self, class_id: ClassId) -> bool {
        self.entries.contains_key(&class_id)
    }

    /// Registered name for `class_id`, if any.
    pub fn name_of(&self, class_id: ClassId) -> Option<&str> {
        self.entries.get(&class_id).map(|e| e.name.as_str())
    }

    /// All override edges as `(base, override)` pairs, sorted by base.
    pub fn overrides(&self) -> Vec<(ClassId, ClassId)> {
        let mut edges: Vec<_> = self.overrides.iter().map(|(b, d)| (*b, *d)).collect();
        edges.sort();
        edges
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no class is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Default for ClassRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for ClassRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("root", &self.root)
            .field("class_count", &self.entries.len())
            .field("override_count", &self.overrides.len())
            .finish()
    }
}
