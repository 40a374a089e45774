//! Keyed record storage for strata.
//!
//! The object-graph engine never touches a storage medium directly. It asks
//! for two functions: "store bytes under a key" and "load bytes for a key".
//! This crate provides backends that answer those requests and adapters that
//! turn a backend into the two functions.
//!
//! # Storage Backends
//!
//! All backends implement the [`RecordStore`] trait:
//!
//! - [`InMemoryRecordStore`] -- `HashMap`-based store for tests and embedding
//! - [`DirRecordStore`] -- one checksummed file per key under a directory
//!
//! # Design Rules
//!
//! 1. The store never interprets record contents -- it is a pure key-value store.
//! 2. Writing an existing key replaces its record.
//! 3. All I/O errors are propagated, never silently ignored.
//! 4. There is no transactional rollback; a failed graph write may leave a
//!    subset of its records stored.

pub mod dir;
pub mod error;
pub mod facility;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use dir::{DirRecordStore, DirStoreConfig};
pub use error::{StoreError, StoreResult};
pub use facility::{load_facility, store_facility};
pub use memory::InMemoryRecordStore;
pub use traits::RecordStore;
