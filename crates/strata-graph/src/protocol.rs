//! The graph wire protocol.
//!
//! A handle reference is one `u32`: the id with the residency flag in the
//! top bit. The first time a resident object is met during a pass, its
//! record is built and handed to the store facility under its id's decimal
//! key:
//!
//! ```text
//! [class id: u32][fields, in the order the object writes them]
//! ```
//!
//! Nested handles inside the fields recurse. An object already visited in
//! the pass is written as its reference only, which is what lets cyclic
//! graphs terminate.
//!
//! Reading mirrors writing: a reference to an object that is already
//! resident resolves to it without touching the load facility. Otherwise the
//! record is loaded, the class is constructed through the registry, and the
//! new object is indexed before its fields are read, so a field pointing
//! back at it finds it resident.

use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_types::{InstanceId, RecordReader, RecordWriter};
use tracing::{debug, trace};

use crate::collect;
use crate::context::Context;
use crate::error::{GraphError, GraphResult};
use crate::handle::Handle;
use crate::heap::{self, CollectGuard, Slot};
use crate::object::{Class, Object};
use crate::registry;

/// Field writer handed to [`Object::serialize_fields`].
pub struct GraphWriter<'a, 'f> {
    ctx: &'a mut Context<'f>,
    out: RecordWriter,
}

impl<'a, 'f> GraphWriter<'a, 'f> {
    /// Append a scalar field.
    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> GraphResult<()> {
        self.out.write(value)?;
        Ok(())
    }

    /// Append a handle field, recursing into its object on first encounter.
    pub fn write_handle<T: Class + ?Sized>(&mut self, handle: &Handle<T>) -> GraphResult<()> {
        serialize(self.ctx, &mut self.out, handle)
    }
}

/// Field reader handed to [`Object::deserialize_fields`].
pub struct GraphReader<'a, 'f> {
    ctx: &'a mut Context<'f>,
    input: RecordReader,
}

impl<'a, 'f> GraphReader<'a, 'f> {
    /// Read the next scalar field.
    pub fn read<T: DeserializeOwned>(&mut self) -> GraphResult<T> {
        Ok(self.input.read()?)
    }

    /// Read the next handle field.
    ///
    /// Fails with [`GraphError::TypeMismatch`] if the referenced object does
    /// not provide `T`.
    pub fn read_handle<T: Class + ?Sized>(&mut self) -> GraphResult<Handle<T>> {
        read_reference(self.ctx, &mut self.input).and_then(require::<T>)
    }

    /// Bytes left in this object's record.
    pub fn remaining(&self) -> usize {
        self.input.remaining()
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write `handle` into `out` and store every object it reaches that the
/// pass has not visited yet.
pub fn serialize<T: Class + ?Sized>(
    ctx: &mut Context<'_>,
    out: &mut RecordWriter,
    handle: &Handle<T>,
) -> GraphResult<()> {
    out.write_instance(handle.identity())?;
    match handle.slot() {
        Some(slot) => {
            ctx.note_reference(slot);
            write_object(ctx, slot)
        }
        None => Ok(()),
    }
}

/// Build and store the record for `slot` unless the pass already visited it.
pub(crate) fn write_object(ctx: &mut Context<'_>, slot: &Rc<Slot>) -> GraphResult<()> {
    if ctx.mark_slot(slot) || !slot.is_alive() {
        return Ok(());
    }
    let value = slot
        .value
        .try_borrow()
        .map_err(|_| GraphError::Busy(slot.id()))?;
    let Some(object) = value.as_deref() else {
        return Ok(());
    };

    let mut writer = GraphWriter {
        ctx,
        out: RecordWriter::new(),
    };
    writer.out.write_class(slot.class_id)?;
    writer.ctx.enter(slot);
    let written = object.serialize_fields(&mut writer);
    writer.ctx.leave();
    written?;

    let GraphWriter { ctx, out } = writer;
    ctx.store(&slot.id().key(), out.as_bytes())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read a handle reference from `input`, loading whatever it needs.
///
/// If the read fails, every object it constructed is destroyed before the
/// error is returned, so a later read starts again from the store.
pub fn deserialize(
    ctx: &mut Context<'_>,
    input: &mut RecordReader,
) -> GraphResult<Handle<dyn Object>> {
    let mark = ctx.created_count();
    let read = read_reference(ctx, input);
    settle(ctx, mark, read)
}

/// Like [`deserialize`], checking that the object provides `T`.
pub fn deserialize_as<T: Class + ?Sized>(
    ctx: &mut Context<'_>,
    input: &mut RecordReader,
) -> GraphResult<Handle<T>> {
    let mark = ctx.created_count();
    let read = read_reference(ctx, input).and_then(require::<T>);
    settle(ctx, mark, read)
}

fn read_reference(
    ctx: &mut Context<'_>,
    input: &mut RecordReader,
) -> GraphResult<Handle<dyn Object>> {
    let id = input.read_instance()?;
    let _guard = CollectGuard::enter();
    read_object(ctx, id)
}

fn require<T: Class + ?Sized>(handle: Handle<dyn Object>) -> GraphResult<Handle<T>> {
    if let Some(slot) = handle.slot() {
        if !slot.provides::<T>() {
            return Err(GraphError::TypeMismatch {
                id: slot.id(),
                expected: T::NAME,
                found: slot.class_name,
            });
        }
    }
    Ok(handle.into_cast())
}

/// Close a top-level read, tearing down what it built if it failed.
fn settle<H>(ctx: &mut Context<'_>, mark: usize, read: GraphResult<H>) -> GraphResult<H> {
    let created = ctx.take_created(mark);
    if let Err(err) = &read {
        let discarded = collect::discard(created);
        if discarded > 0 {
            debug!(%err, discarded, "failed read discarded partial objects");
        }
    }
    read
}

fn read_object(ctx: &mut Context<'_>, id: InstanceId) -> GraphResult<Handle<dyn Object>> {
    if let Some(slot) = heap::lookup(id) {
        ctx.mark_slot(&slot);
        trace!(id = %id, "reference resolved to resident object");
        return Ok(Handle::from_slot(slot));
    }
    if !id.is_valid() || !id.is_resident() {
        return Ok(Handle::placeholder(id));
    }

    let key = id.key();
    let mut record = RecordReader::new(ctx.load(&key)?);
    let class_id = record.read_class()?;
    let object =
        registry::construct_boxed(class_id).ok_or(GraphError::UnknownClass { class_id, key })?;

    InstanceId::observe(id.id());
    let slot = Slot::adopt(object, id);
    ctx.mark_slot(&slot);
    ctx.note_created(&slot);
    let handle = Handle::from_slot(Rc::clone(&slot));
    trace!(id = %id, class = slot.class_name, "object constructed from record");

    let mut value = slot.value.borrow_mut();
    if let Some(object) = value.as_deref_mut() {
        let mut reader = GraphReader { ctx, input: record };
        object.deserialize_fields(&mut reader)?;
    }
    drop(value);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{setup, Circle, Node, Shape};
    use strata_store::{load_facility, store_facility, InMemoryRecordStore, RecordStore};
    use strata_types::ClassId;

    fn reference(id: InstanceId) -> RecordReader {
        RecordReader::new(id.to_wire().to_le_bytes().to_vec())
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    #[test]
    fn placeholder_writes_identity_only() {
        let store = InMemoryRecordStore::new();
        let mut ctx = Context::with_store(store_facility(&store));
        let mut out = RecordWriter::new();
        let ph = Handle::<Node>::placeholder(InstanceId::new(12, false));
        serialize(&mut ctx, &mut out, &ph).unwrap();
        assert_eq!(out.as_bytes(), 12u32.to_le_bytes());
        assert!(store.is_empty());
    }

    #[test]
    fn resident_reference_sets_flag_bit() {
        setup();
        let store = InMemoryRecordStore::new();
        let node = Handle::new(Node::named("flagged"));
        let mut ctx = Context::with_store(store_facility(&store));
        let mut out = RecordWriter::new();
        serialize(&mut ctx, &mut out, &node).unwrap();
        let wire = u32::from_le_bytes(out.as_bytes().try_into().unwrap());
        assert_eq!(wire, node.id().id() | InstanceId::FLAG_BIT);
    }

    #[test]
    fn record_starts_with_class_id() {
        setup();
        let store = InMemoryRecordStore::new();
        let node = Handle::new(Node::named("n"));
        node.serialize(store_facility(&store)).unwrap();
        let record = store.get(&node.id().key()).unwrap().unwrap();
        let mut reader = RecordReader::new(record);
        assert_eq!(reader.read_class().unwrap(), ClassId::of("Node"));
        assert_eq!(reader.read::<String>().unwrap(), "n");
    }

    #[test]
    fn shared_child_is_written_once() {
        setup();
        let store = InMemoryRecordStore::new();
        let child = Handle::new(Node::named("child"));
        let parent = Handle::new(Node::linked("parent", &child));
        let mut ctx = Context::with_store(store_facility(&store));
        let mut out = RecordWriter::new();
        serialize(&mut ctx, &mut out, &parent).unwrap();
        serialize(&mut ctx, &mut out, &child).unwrap();
        assert_eq!(ctx.records_written(), 2);
        assert_eq!(ctx.visited_count(), 2);
    }

    #[test]
    fn mutably_borrowed_object_is_busy() {
        setup();
        let node = Handle::new(Node::named("busy"));
        let _guard = node.borrow_mut();
        let mut ctx = Context::with_store(|_: &str, _: &[u8]| Ok(()));
        let mut out = RecordWriter::new();
        let err = serialize(&mut ctx, &mut out, &node).unwrap_err();
        assert!(matches!(err, GraphError::Busy(id) if id == node.id()));
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    #[test]
    fn resident_reference_resolves_without_loading() {
        setup();
        let node = Handle::new(Node::named("here"));
        let mut ctx = Context::with_load(|key: &str| panic!("unexpected load of {key}"));
        let read = deserialize(&mut ctx, &mut reference(node.identity())).unwrap();
        assert!(read.ptr_eq(&node));
    }

    #[test]
    fn invalid_and_unresident_references_are_placeholders() {
        for raw in [0, 55, InstanceId::FLAG_BIT] {
            let mut input = RecordReader::new(raw.to_le_bytes().to_vec());
            let mut ctx = Context::with_load(|key: &str| panic!("unexpected load of {key}"));
            let read = deserialize(&mut ctx, &mut input).unwrap();
            assert!(read.is_empty());
            assert_eq!(read.id().id(), raw & InstanceId::ID_MASK);
        }
    }

    #[test]
    fn typed_read_checks_capability() {
        setup();
        let store = InMemoryRecordStore::new();
        let node = Handle::new(Node::named("not a shape"));
        let id = node.identity();
        node.serialize(store_facility(&store)).unwrap();
        drop(node);

        let mut ctx = Context::with_load(load_facility(&store));
        let err = deserialize_as::<dyn Shape>(&mut ctx, &mut reference(id)).unwrap_err();
        match err {
            GraphError::TypeMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, "Shape");
                assert_eq!(found, "Node");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn typed_read_accepts_capability() {
        setup();
        let store = InMemoryRecordStore::new();
        let circle = Handle::new(Circle { radius: 2.0 });
        let id = circle.identity();
        circle.serialize(store_facility(&store)).unwrap();
        drop(circle);

        let mut ctx = Context::with_load(load_facility(&store));
        let shape = deserialize_as::<dyn Shape>(&mut ctx, &mut reference(id)).unwrap();
        assert_eq!(shape.borrow().area(), Circle { radius: 2.0 }.area());
        assert_eq!(ctx.records_loaded(), 1);
    }

    #[test]
    fn unknown_class_is_an_error() {
        let mut record = RecordWriter::new();
        record.write_class(ClassId::of("NeverRegistered")).unwrap();
        let bytes = record.into_bytes();

        let id = InstanceId::new(31_337, true);
        let mut ctx = Context::with_load(move |_: &str| Ok(bytes.clone()));
        match deserialize(&mut ctx, &mut reference(id)) {
            Err(GraphError::UnknownClass { class_id, key }) => {
                assert_eq!(class_id, ClassId::of("NeverRegistered"));
                assert_eq!(key, "31337");
            }
            other => panic!("expected UnknownClass, got {other:?}"),
        }
        assert!(!heap::is_live(id));
    }

    #[test]
    fn truncated_record_is_a_codec_error() {
        let id = InstanceId::new(4_242, true);
        let mut ctx = Context::with_load(|_: &str| Ok(vec![1, 2]));
        let err = deserialize(&mut ctx, &mut reference(id)).unwrap_err();
        assert!(matches!(err, GraphError::Codec(_)));
        let message = err.to_string();
        assert!(message.starts_with("codec error: "));
        assert_eq!(message.matches("codec error").count(), 1);
    }

    #[test]
    fn failed_read_keeps_objects_from_earlier_reads() {
        setup();
        let store = InMemoryRecordStore::new();
        let node = Handle::new(Node::named("kept"));
        let id = node.identity();
        node.serialize(store_facility(&store)).unwrap();
        drop(node);

        let mut ctx = Context::with_load(load_facility(&store));
        let first = deserialize(&mut ctx, &mut reference(id)).unwrap();
        let missing = InstanceId::new(8_888_001, true);
        let err = deserialize(&mut ctx, &mut reference(missing)).unwrap_err();
        assert!(matches!(err, GraphError::Store(_)));
        assert!(first.is_bound());
        assert!(heap::is_live(id));
    }
}
