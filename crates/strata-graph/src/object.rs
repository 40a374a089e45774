//! The root of the polymorphic hierarchy.
//!
//! Every persistable type implements two traits:
//!
//! - [`Reflect`] -- class identity and capability casting. Generated by the
//!   [`object!`](crate::object!) macro from the type's capability list.
//! - [`Object`] -- field (de)serialization. Written by hand; both methods
//!   default to no-ops.
//!
//! Handle targets implement [`Class`]: concrete types get it from
//! [`object!`](crate::object!), capability traits from
//! [`capability!`](crate::capability!), and `dyn Object` has it built in.
//!
//! ```
//! use strata_graph::{object, GraphReader, GraphResult, GraphWriter, Handle, Object};
//!
//! #[derive(Default)]
//! struct Counter {
//!     value: u64,
//! }
//!
//! object!(Counter);
//!
//! impl Object for Counter {
//!     fn serialize_fields(&self, w: &mut GraphWriter<'_, '_>) -> GraphResult<()> {
//!         w.write(&self.value)
//!     }
//!
//!     fn deserialize_fields(&mut self, r: &mut GraphReader<'_, '_>) -> GraphResult<()> {
//!         self.value = r.read()?;
//!         Ok(())
//!     }
//! }
//!
//! let counter = Handle::new(Counter { value: 3 });
//! assert_eq!(counter.borrow().value, 3);
//! ```

use std::any::Any;
use std::ptr::NonNull;

use strata_types::ClassId;

use crate::error::GraphResult;
use crate::protocol::{GraphReader, GraphWriter};

/// Class identity and capability casting for a persistable type.
///
/// Implemented by [`object!`](crate::object!); implementing it by hand is
/// possible but rarely useful.
pub trait Reflect: Any {
    /// The concrete type's stable class id.
    fn class_id(&self) -> ClassId;

    /// The concrete type's class name.
    fn class_name(&self) -> &'static str;

    /// Every class id this object can be cast to: its own class, the root
    /// `dyn Object`, then the declared capabilities.
    fn capabilities(&self) -> &'static [ClassId];

    /// Upcast to `Any`.
    fn as_any(&self) -> &dyn Any;

    /// Upcast to `Any`, mutably.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Capability lookup.
    ///
    /// If the concrete type declares the capability `target` (its own class,
    /// the root `dyn Object`, or a listed capability trait), writes a pointer
    /// to `self` viewed as that capability into `out` and returns `true`.
    /// `out` must be an `Option<NonNull<C>>` where `C` is the capability type.
    fn dynamic_cast(&self, target: ClassId, out: &mut dyn Any) -> bool;

    /// Mutable counterpart of [`dynamic_cast`](Self::dynamic_cast).
    fn dynamic_cast_mut(&mut self, target: ClassId, out: &mut dyn Any) -> bool;
}

/// A persistable object.
///
/// Concrete types stream their own scalar and handle fields. Fields must be
/// read back in the order they were written.
pub trait Object: Reflect {
    /// Write this object's fields.
    fn serialize_fields(&self, _w: &mut GraphWriter<'_, '_>) -> GraphResult<()> {
        Ok(())
    }

    /// Read this object's fields.
    fn deserialize_fields(&mut self, _r: &mut GraphReader<'_, '_>) -> GraphResult<()> {
        Ok(())
    }
}

/// A type that a [`Handle`](crate::Handle) can point at.
pub trait Class: 'static {
    /// Name the class id is derived from.
    const NAME: &'static str;

    /// The class id for [`NAME`](Self::NAME).
    fn static_class_id() -> ClassId {
        ClassId::of(Self::NAME)
    }
}

impl Class for dyn Object {
    const NAME: &'static str = ClassId::ROOT_NAME;
}

/// Store `value` as a capability pointer into `out`.
///
/// Used by the code [`object!`](crate::object!) generates.
#[doc(hidden)]
pub fn store_cast<C: ?Sized + 'static>(value: &C, out: &mut dyn Any) -> bool {
    match out.downcast_mut::<Option<NonNull<C>>>() {
        Some(slot) => {
            *slot = Some(NonNull::from(value));
            true
        }
        None => false,
    }
}

/// Mutable counterpart of [`store_cast`].
#[doc(hidden)]
pub fn store_cast_mut<C: ?Sized + 'static>(value: &mut C, out: &mut dyn Any) -> bool {
    match out.downcast_mut::<Option<NonNull<C>>>() {
        Some(slot) => {
            *slot = Some(NonNull::from(value));
            true
        }
        None => false,
    }
}

/// View `object` as capability `T`, if its class declares it.
pub fn cast_ref<T: Class + ?Sized>(object: &dyn Object) -> Option<&T> {
    let mut out: Option<NonNull<T>> = None;
    if !object.dynamic_cast(T::static_class_id(), &mut out) {
        return None;
    }
    // SAFETY: `dynamic_cast` only writes a pointer derived from the `&self`
    // it was called with, which is `object`. The returned reference carries
    // the lifetime of that shared borrow.
    out.map(|ptr| unsafe { &*ptr.as_ptr() })
}

/// Mutable counterpart of [`cast_ref`].
pub fn cast_mut<T: Class + ?Sized>(object: &mut dyn Object) -> Option<&mut T> {
    let mut out: Option<NonNull<T>> = None;
    if !object.dynamic_cast_mut(T::static_class_id(), &mut out) {
        return None;
    }
    // SAFETY: the pointer was derived from the exclusive borrow `object`,
    // and the returned reference keeps that borrow alive.
    out.map(|ptr| unsafe { &mut *ptr.as_ptr() })
}

/// Returns `true` if `object` provides capability `T`.
pub fn provides<T: Class + ?Sized>(object: &dyn Object) -> bool {
    cast_ref::<T>(object).is_some()
}

/// Implement [`Class`] and [`Reflect`] for a concrete persistable type.
///
/// ```text
/// object!(Node);                      // class name "Node"
/// object!(Circle: dyn Shape);         // also castable to dyn Shape
/// object!(CircleV2 as "Circle.v2");   // explicit class name
/// ```
///
/// The type must implement [`Object`] (and every listed capability trait).
#[macro_export]
macro_rules! object {
    ($name:ident as $wire:literal $(: $($cap:ty),+ $(,)?)?) => {
        $crate::__object_impl!($name, $wire, [$($($cap),+)?]);
    };
    ($name:ident $(: $($cap:ty),+ $(,)?)?) => {
        $crate::__object_impl!($name, stringify!($name), [$($($cap),+)?]);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __object_impl {
    ($name:ident, $wire:expr, [$($cap:ty),*]) => {
        impl $crate::Class for $name {
            const NAME: &'static str = $wire;

            fn static_class_id() -> $crate::ClassId {
                static ID: ::std::sync::OnceLock<$crate::ClassId> = ::std::sync::OnceLock::new();
                *ID.get_or_init(|| $crate::ClassId::of(<Self as $crate::Class>::NAME))
            }
        }

        impl $crate::Reflect for $name {
            fn class_id(&self) -> $crate::ClassId {
                <Self as $crate::Class>::static_class_id()
            }

            fn class_name(&self) -> &'static str {
                <Self as $crate::Class>::NAME
            }

            fn capabilities(&self) -> &'static [$crate::ClassId] {
                static CAPS: ::std::sync::OnceLock<::std::vec::Vec<$crate::ClassId>> =
                    ::std::sync::OnceLock::new();
                CAPS.get_or_init(|| {
                    ::std::vec![
                        <Self as $crate::Class>::static_class_id(),
                        <dyn $crate::Object as $crate::Class>::static_class_id(),
                        $(<$cap as $crate::Class>::static_class_id(),)*
                    ]
                })
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn dynamic_cast(
                &self,
                target: $crate::ClassId,
                out: &mut dyn ::std::any::Any,
            ) -> bool {
                if target == <Self as $crate::Class>::static_class_id() {
                    return $crate::object::store_cast::<Self>(self, out);
                }
                if target == <dyn $crate::Object as $crate::Class>::static_class_id() {
                    return $crate::object::store_cast::<dyn $crate::Object>(self, out);
                }
                $(
                    if target == <$cap as $crate::Class>::static_class_id() {
                        return $crate::object::store_cast::<$cap>(self, out);
                    }
                )*
                false
            }

            fn dynamic_cast_mut(
                &mut self,
                target: $crate::ClassId,
                out: &mut dyn ::std::any::Any,
            ) -> bool {
                if target == <Self as $crate::Class>::static_class_id() {
                    return $crate::object::store_cast_mut::<Self>(self, out);
                }
                if target == <dyn $crate::Object as $crate::Class>::static_class_id() {
                    return $crate::object::store_cast_mut::<dyn $crate::Object>(self, out);
                }
                $(
                    if target == <$cap as $crate::Class>::static_class_id() {
                        return $crate::object::store_cast_mut::<$cap>(self, out);
                    }
                )*
                false
            }
        }
    };
}

/// Implement [`Class`] for a capability trait object.
///
/// ```text
/// pub trait Shape: Object { fn area(&self) -> f64; }
/// capability!(Shape);
/// ```
#[macro_export]
macro_rules! capability {
    ($tr:ident as $wire:expr) => {
        impl $crate::Class for dyn $tr {
            const NAME: &'static str = $wire;
        }
    };
    ($tr:ident) => {
        $crate::capability!($tr as stringify!($tr));
    };
}
