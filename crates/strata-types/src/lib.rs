//! Foundation types for strata.
//!
//! This crate provides the identity and wire-level primitives used by the
//! object-graph engine. Every other strata crate depends on `strata-types`.
//!
//! # Key Types
//!
//! - [`InstanceId`] -- Identity of an object instance, carrying a residency flag
//! - [`ClassId`] -- Stable 32-bit class identifier derived from a class name
//! - [`RecordWriter`] / [`RecordReader`] -- Ordered primitive codec for object records

pub mod class;
pub mod codec;
pub mod error;
pub mod identity;

pub use class::ClassId;
pub use codec::{RecordReader, RecordWriter};
pub use error::TypeError;
pub use identity::InstanceId;
