//! Object-graph persistence engine for strata.
//!
//! Programs hold typed, reference-counted [`Handle`]s to polymorphic
//! objects. A handle's whole reachable subgraph can be written to a byte
//! store and read back lazily, one object record per key, with cycles and
//! shared objects handled on both sides.
//!
//! # Modules
//!
//! - [`object`] -- the [`Object`] trait, class identity, capability casts
//! - [`handle`] -- the owning [`Handle`] and its placeholders
//! - [`heap`] -- per-thread live-object index, root, and configuration
//! - [`collect`] -- cycle-breaking release
//! - [`context`] / [`protocol`] -- the graph wire protocol
//! - [`registry`] -- construction by class id, with overrides
//!
//! # Example
//!
//! ```
//! use strata_graph::{object, registry, GraphReader, GraphResult, GraphWriter, Handle, Object};
//! use strata_store::{load_facility, store_facility, InMemoryRecordStore};
//!
//! #[derive(Default)]
//! struct Note {
//!     text: String,
//!     next: Handle<Note>,
//! }
//!
//! object!(Note);
//!
//! impl Object for Note {
//!     fn serialize_fields(&self, w: &mut GraphWriter<'_, '_>) -> GraphResult<()> {
//!         w.write(&self.text)?;
//!         w.write_handle(&self.next)
//!     }
//!
//!     fn deserialize_fields(&mut self, r: &mut GraphReader<'_, '_>) -> GraphResult<()> {
//!         self.text = r.read()?;
//!         self.next = r.read_handle()?;
//!         Ok(())
//!     }
//! }
//!
//! registry::register_class::<Note>().unwrap();
//!
//! let store = InMemoryRecordStore::new();
//! let mut note = Handle::new(Note { text: "hello".into(), next: Handle::empty() });
//! note.serialize(store_facility(&store)).unwrap();
//!
//! note.unload();
//! assert!(note.is_empty());
//! note.load(load_facility(&store)).unwrap();
//! assert_eq!(note.borrow().text, "hello");
//! ```

pub mod collect;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod heap;
pub mod object;
pub mod protocol;
pub mod registry;

#[cfg(test)]
mod testing;

pub use config::{HeapConfig, RootPolicy};
pub use context::{Context, LoadFn, StoreFn};
pub use error::{GraphError, GraphResult};
pub use handle::{Handle, ObjectMut};
pub use object::{cast_mut, cast_ref, provides, Class, Object, Reflect};
pub use protocol::{deserialize, deserialize_as, serialize, GraphReader, GraphWriter};
pub use strata_types::{ClassId, InstanceId};
