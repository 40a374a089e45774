//! Polymorphic class registry for strata.
//!
//! Maps a wire-level [`ClassId`] to a factory that builds the concrete type,
//! and records override edges so that a class id found in old data resolves
//! to whichever implementation is currently registered as its override.
//!
//! [`ClassId`]: strata_types::ClassId

pub mod error;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{ClassRegistry, Factory};
