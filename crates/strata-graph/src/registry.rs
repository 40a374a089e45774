//! The process-wide class registry for persistable types.
//!
//! Registration normally happens once at startup. A duplicate class id is a
//! configuration error; callers are expected to treat it as fatal.

use std::sync::{Arc, LazyLock, RwLock};

use strata_registry::{ClassRegistry, Factory};
use strata_types::ClassId;

use crate::error::GraphResult;
use crate::handle::Handle;
use crate::object::{Class, Object};

static REGISTRY: LazyLock<RwLock<ClassRegistry<dyn Object>>> =
    LazyLock::new(|| RwLock::new(ClassRegistry::new()));

/// Register `T`, constructed through `T::default()`.
pub fn register_class<T>() -> GraphResult<()>
where
    T: Object + Class + Default,
{
    register_factory::<T>(ClassId::root(), default_factory::<T>())
}

/// Register `T` as the override for `B`: construction requests for `B`
/// produce a `T` from now on.
pub fn register_override<T, B>() -> GraphResult<()>
where
    T: Object + Class + Default,
    B: Class + ?Sized,
{
    register_factory::<T>(B::static_class_id(), default_factory::<T>())
}

fn default_factory<T: Object + Default>() -> Factory<dyn Object> {
    Arc::new(|| Box::new(T::default()) as Box<dyn Object>)
}

/// Register `T` with an explicit base id and factory.
pub fn register_factory<T>(base: ClassId, factory: Factory<dyn Object>) -> GraphResult<()>
where
    T: Class + ?Sized,
{
    REGISTRY
        .write()
        .expect("lock poisoned")
        .register(T::static_class_id(), base, T::NAME, factory)?;
    Ok(())
}

/// Remove `T` and every override edge pointing at it.
pub fn unregister_class<T: Class + ?Sized>() -> bool {
    REGISTRY
        .write()
        .expect("lock poisoned")
        .unregister(T::static_class_id())
}

/// Returns `true` if exactly `T` is registered.
pub fn is_registered<T: Class + ?Sized>() -> bool {
    REGISTRY
        .read()
        .expect("lock poisoned")
        .contains(T::static_class_id())
}

/// The id construction requests for `class_id` currently resolve to.
pub fn resolve(class_id: ClassId) -> ClassId {
    REGISTRY.read().expect("lock poisoned").resolve(class_id)
}

/// Registered name for `class_id`.
pub fn class_name(class_id: ClassId) -> Option<String> {
    REGISTRY
        .read()
        .expect("lock poisoned")
        .name_of(class_id)
        .map(str::to_owned)
}

/// Construct a fresh object for `class_id` on the heap, honouring overrides.
pub fn construct(class_id: ClassId) -> Option<Handle<dyn Object>> {
    construct_boxed(class_id).map(Handle::from_object)
}

pub(crate) fn construct_boxed(class_id: ClassId) -> Option<Box<dyn Object>> {
    // Factories run outside the lock.
    let factory = {
        let registry = REGISTRY.read().expect("lock poisoned");
        let resolved = registry.resolve(class_id);
        registry.factory(resolved)?
    };
    Some(factory())
}
