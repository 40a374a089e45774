//! End-to-end tests for the object-graph engine.
//!
//! Graphs are written through the public handle API into real record stores
//! (in memory and on disk) and read back, covering shared objects, cycles,
//! placeholders, lazy loading, class overrides, and facility failures.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Once;

use proptest::prelude::*;
use strata_graph::{
    capability, heap, object, registry, ClassId, GraphError, GraphReader, GraphResult,
    GraphWriter, Handle, InstanceId, Object,
};
use strata_store::{
    load_facility, store_facility, DirRecordStore, DirStoreConfig, InMemoryRecordStore,
    RecordStore, StoreError,
};
use strata_types::{RecordReader, RecordWriter};

// ─── Fixtures ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Node {
    label: String,
    next: Handle<Node>,
}

object!(Node);

impl Node {
    fn new(label: &str) -> Handle<Node> {
        Handle::new(Node {
            label: label.into(),
            next: Handle::empty(),
        })
    }
}

impl Object for Node {
    fn serialize_fields(&self, w: &mut GraphWriter<'_, '_>) -> GraphResult<()> {
        w.write(&self.label)?;
        w.write_handle(&self.next)
    }

    fn deserialize_fields(&mut self, r: &mut GraphReader<'_, '_>) -> GraphResult<()> {
        self.label = r.read()?;
        self.next = r.read_handle()?;
        Ok(())
    }
}

/// Two edges, so one object can be referenced twice from the same record.
#[derive(Default)]
struct Pair {
    left: Handle<dyn Object>,
    right: Handle<dyn Object>,
}

object!(Pair);

impl Object for Pair {
    fn serialize_fields(&self, w: &mut GraphWriter<'_, '_>) -> GraphResult<()> {
        w.write_handle(&self.left)?;
        w.write_handle(&self.right)
    }

    fn deserialize_fields(&mut self, r: &mut GraphReader<'_, '_>) -> GraphResult<()> {
        self.left = r.read_handle()?;
        self.right = r.read_handle()?;
        Ok(())
    }
}

trait Versioned: Object {
    fn version(&self) -> u32;
}

capability!(Versioned);

#[derive(Default)]
struct LegacyDoc {
    body: String,
}

object!(LegacyDoc: dyn Versioned);

impl Object for LegacyDoc {
    fn serialize_fields(&self, w: &mut GraphWriter<'_, '_>) -> GraphResult<()> {
        w.write(&self.body)
    }

    fn deserialize_fields(&mut self, r: &mut GraphReader<'_, '_>) -> GraphResult<()> {
        self.body = r.read()?;
        Ok(())
    }
}

impl Versioned for LegacyDoc {
    fn version(&self) -> u32 {
        1
    }
}

#[derive(Default)]
struct ModernDoc {
    body: String,
}

object!(ModernDoc as "ModernDoc.v2": dyn Versioned);

impl Object for ModernDoc {
    fn deserialize_fields(&mut self, r: &mut GraphReader<'_, '_>) -> GraphResult<()> {
        self.body = r.read::<String>()?.to_uppercase();
        Ok(())
    }
}

impl Versioned for ModernDoc {
    fn version(&self) -> u32 {
        2
    }
}

fn setup() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        registry::register_class::<Node>().expect("register Node");
        registry::register_class::<Pair>().expect("register Pair");
        registry::register_class::<LegacyDoc>().expect("register LegacyDoc");
    });
}

/// A two-node cycle `a <-> b`.
fn two_cycle() -> (Handle<Node>, Handle<Node>) {
    let a = Node::new("a");
    let b = Node::new("b");
    a.borrow_mut().next = b.clone();
    b.borrow_mut().next = a.clone();
    (a, b)
}

/// Two pairs whose left edges point at each other.
fn pair_cycle() -> (Handle<Pair>, Handle<Pair>) {
    let a = Handle::new(Pair::default());
    let b = Handle::new(Pair::default());
    a.borrow_mut().left = b.upcast();
    b.borrow_mut().left = a.upcast();
    (a, b)
}

fn node_record(label: &str, next: InstanceId) -> Vec<u8> {
    let mut record = RecordWriter::new();
    record.write_class(ClassId::of("Node")).unwrap();
    record.write(label).unwrap();
    record.write_instance(next).unwrap();
    record.into_bytes()
}

// ─── Round trips ───────────────────────────────────────────────────────────

#[test]
fn acyclic_graph_round_trips_with_identities() {
    setup();
    let store = InMemoryRecordStore::new();

    let tail = Node::new("tail");
    let head = Node::new("head");
    head.borrow_mut().next = tail.clone();
    let (head_id, tail_id) = (head.id(), tail.id());

    head.serialize(store_facility(&store)).unwrap();
    assert_eq!(store.len(), 2);
    drop(tail);
    drop(head);
    assert!(!heap::is_live(head_id));

    let mut loaded = Handle::<Node>::placeholder(head_id);
    loaded.load(load_facility(&store)).unwrap();
    assert_eq!(loaded.id(), head_id);
    assert_eq!(loaded.borrow().label, "head");
    let next = loaded.borrow().next.clone();
    assert_eq!(next.id(), tail_id);
    assert_eq!(next.borrow().label, "tail");
    assert!(next.borrow().next.is_empty());
}

#[test]
fn directory_store_round_trip() {
    setup();
    let dir = tempfile::tempdir().unwrap();
    let store = DirRecordStore::open(dir.path(), DirStoreConfig::default()).unwrap();

    let (a, b) = two_cycle();
    let id = a.id();
    a.serialize(store_facility(&store)).unwrap();
    assert_eq!(store.keys().unwrap().len(), 2);
    drop(b);
    drop(a);

    let mut reopened = Handle::<Node>::placeholder(id);
    reopened.load(load_facility(&store)).unwrap();
    let b = reopened.borrow().next.clone();
    assert_eq!(b.borrow().label, "b");
    assert!(b.borrow().next.ptr_eq(&reopened));
}

// ─── Cycles ────────────────────────────────────────────────────────────────

#[test]
fn cycle_is_written_once_per_object() {
    setup();
    let store = InMemoryRecordStore::new();
    let (mut a, mut b) = two_cycle();
    a.set_id(1);
    b.set_id(2);

    a.serialize(store_facility(&store)).unwrap();
    assert_eq!(store.keys().unwrap(), vec!["1", "2"]);

    let mut record = RecordReader::new(store.get("2").unwrap().unwrap());
    assert_eq!(record.read_class().unwrap(), ClassId::of("Node"));
    assert_eq!(record.read::<String>().unwrap(), "b");
    assert_eq!(record.read_u32().unwrap(), 1 | InstanceId::FLAG_BIT);
    assert!(record.is_exhausted());
}

#[test]
fn cycle_is_read_back_cross_wired() {
    setup();
    let records: HashMap<&str, Vec<u8>> = HashMap::from([
        ("1", node_record("one", InstanceId::new(2, true))),
        ("2", node_record("two", InstanceId::new(1, true))),
    ]);
    let loads = RefCell::new(Vec::new());

    let mut one = Handle::<Node>::placeholder(InstanceId::new(1, true));
    one.load(|key: &str| {
        loads.borrow_mut().push(key.to_string());
        records
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.into()))
    })
    .unwrap();

    assert_eq!(*loads.borrow(), vec!["1", "2"]);
    let two = one.borrow().next.clone();
    assert_eq!(two.id().id(), 2);
    assert_eq!(two.borrow().label, "two");
    assert!(two.borrow().next.ptr_eq(&one));
    assert_eq!(one.ref_count(), 2);
    assert_eq!(two.ref_count(), 2);
}

#[test]
fn released_cycle_is_destroyed() {
    setup();
    let anchor = Node::new("anchor");
    heap::set_root(&anchor);
    let (a, b) = two_cycle();
    let (ida, idb) = (a.id(), b.id());
    drop(a);
    drop(b);
    assert!(!heap::is_live(ida));
    assert!(!heap::is_live(idb));
    assert!(heap::is_live(anchor.id()));
}

#[test]
fn cycle_reachable_from_root_is_kept() {
    setup();
    let anchor = Node::new("anchor");
    heap::set_root(&anchor);
    let (a, b) = two_cycle();
    anchor.borrow_mut().next = a.clone();
    let (ida, idb) = (a.id(), b.id());
    drop(a);
    drop(b);
    assert!(heap::is_live(ida) && heap::is_live(idb));

    anchor.borrow_mut().next = Handle::empty();
    assert!(!heap::is_live(ida) && !heap::is_live(idb));
}

// ─── Reference counting ────────────────────────────────────────────────────

#[test]
fn last_handle_frees_object() {
    setup();
    let first = Node::new("counted");
    let id = first.id();
    let mut handles: Vec<_> = (0..5).map(|_| first.clone()).collect();
    drop(first);
    while handles.len() > 1 {
        handles.pop();
        assert!(heap::is_live(id));
    }
    assert_eq!(handles[0].borrow().label, "counted");
    handles.clear();
    assert!(!heap::is_live(id));
}

// ─── Placeholders and lazy loading ─────────────────────────────────────────

#[test]
fn empty_handle_then_load() {
    setup();
    let store = InMemoryRecordStore::new();
    let original = Node::new("lazy");
    let id = original.id();
    original.serialize(store_facility(&store)).unwrap();
    drop(original);

    let mut handle = Handle::<Node>::placeholder(id);
    assert!(handle.is_empty());
    assert!(handle.get().is_none());
    handle.load(load_facility(&store)).unwrap();
    assert!(handle.is_bound());
    assert_eq!(handle.id(), id);
    assert!(handle.is_resident());
}

#[test]
fn unloaded_child_is_written_as_reference_only() {
    setup();
    let store = InMemoryRecordStore::new();
    let parent = Node::new("parent");
    let child = Node::new("child");
    parent.borrow_mut().next = child.clone();
    parent.serialize(store_facility(&store)).unwrap();
    drop(child);

    parent.borrow_mut().next.unload();
    assert!(parent.borrow().next.is_empty());
    store.clear();
    parent.serialize(store_facility(&store)).unwrap();
    assert_eq!(store.len(), 1);

    let parent_id = parent.id();
    drop(parent);
    let before = store.keys().unwrap();
    assert_eq!(before, vec![parent_id.key()]);

    let mut reloaded = Handle::<Node>::placeholder(parent_id);
    reloaded.load(load_facility(&store)).unwrap();
    let next = reloaded.borrow().next.clone();
    assert!(next.is_empty());
    assert!(!next.is_resident());
    assert!(next.id().is_valid());
}

#[test]
fn invalid_reference_is_never_loaded() {
    setup();
    let store = InMemoryRecordStore::new();
    let lonely = Node::new("lonely");
    let id = lonely.id();
    lonely.serialize(store_facility(&store)).unwrap();
    drop(lonely);

    let mut keys = Vec::new();
    let mut handle = Handle::<Node>::placeholder(id);
    let mut load = load_facility(&store);
    handle
        .load(|key: &str| {
            keys.push(key.to_string());
            load(key)
        })
        .unwrap();
    assert_eq!(keys, vec![id.key()]);
    assert!(handle.borrow().next.is_empty());
    assert!(!handle.borrow().next.id().is_valid());
}

// ─── Sharing ───────────────────────────────────────────────────────────────

#[test]
fn shared_object_is_loaded_once() {
    setup();
    let store = InMemoryRecordStore::new();
    let shared = Node::new("shared");
    let pair = Handle::new(Pair {
        left: shared.upcast(),
        right: shared.upcast(),
    });
    let pair_id = pair.id();
    pair.serialize(store_facility(&store)).unwrap();
    assert_eq!(store.len(), 2);
    drop(shared);
    drop(pair);

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut load = load_facility(&store);
    let mut loaded = Handle::<Pair>::placeholder(pair_id);
    loaded
        .load(|key: &str| {
            *counts.entry(key.to_string()).or_default() += 1;
            load(key)
        })
        .unwrap();

    assert!(counts.values().all(|&n| n == 1));
    assert_eq!(counts.len(), 2);
    let pair = loaded.borrow();
    assert_eq!(pair.left, pair.right);
    assert_eq!(pair.left.ref_count(), 2);
}

// ─── Registry ──────────────────────────────────────────────────────────────

#[test]
fn override_constructs_newest_class() {
    setup();
    let store = InMemoryRecordStore::new();
    let doc = Handle::new(LegacyDoc {
        body: "hello".into(),
    });
    let id = doc.id();
    doc.serialize(store_facility(&store)).unwrap();
    drop(doc);

    registry::register_override::<ModernDoc, LegacyDoc>().unwrap();
    let mut upgraded = Handle::<dyn Versioned>::placeholder(id);
    upgraded.load(load_facility(&store)).unwrap();
    registry::unregister_class::<ModernDoc>();

    assert_eq!(upgraded.class_name(), Some("ModernDoc.v2"));
    assert_eq!(upgraded.borrow().version(), 2);
    let modern: Handle<ModernDoc> = upgraded.cast();
    assert_eq!(modern.borrow().body, "HELLO");
}

#[test]
fn typed_load_rejects_wrong_class() {
    setup();
    let store = InMemoryRecordStore::new();
    let node = Node::new("plain");
    let id = node.id();
    node.serialize(store_facility(&store)).unwrap();
    drop(node);

    let mut doc = Handle::<dyn Versioned>::placeholder(id);
    let err = doc.load(load_facility(&store)).unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { found: "Node", .. }));
    assert!(doc.is_empty());
    assert!(!heap::is_live(id));
}

#[test]
fn typed_load_of_wrong_cycle_leaves_nothing_resident() {
    setup();
    let store = InMemoryRecordStore::new();
    let anchor = Node::new("anchor");
    heap::set_root(&anchor);
    let (a, b) = pair_cycle();
    let (ida, idb) = (a.id(), b.id());
    a.serialize(store_facility(&store)).unwrap();
    drop(a);
    drop(b);
    assert!(!heap::is_live(ida) && !heap::is_live(idb));
    let before = heap::live_count();

    let mut doc = Handle::<dyn Versioned>::placeholder(ida);
    let err = doc.load(load_facility(&store)).unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { found: "Pair", .. }));
    assert!(doc.is_empty());
    assert!(!heap::is_live(ida));
    assert!(!heap::is_live(idb));
    assert_eq!(heap::live_count(), before);
}

// ─── Facility failures ─────────────────────────────────────────────────────

#[test]
fn store_failure_aborts_serialization() {
    setup();
    let (a, _b) = two_cycle();
    let mut calls = 0;
    let err = a
        .serialize(|key: &str, _: &[u8]| {
            calls += 1;
            Err(StoreError::Backend(format!("disk full writing {key}")))
        })
        .unwrap_err();
    assert!(matches!(err, GraphError::Store(StoreError::Backend(_))));
    assert_eq!(calls, 1);
}

#[test]
fn missing_record_is_reported() {
    setup();
    let store = InMemoryRecordStore::new();
    let mut handle = Handle::<Node>::placeholder(InstanceId::new(77, true));
    let err = handle.load(load_facility(&store)).unwrap_err();
    assert!(matches!(err, GraphError::Store(StoreError::NotFound(key)) if key == "77"));
    assert!(handle.is_empty());
}

#[test]
fn failed_load_discards_partial_cycle() {
    setup();
    let store = InMemoryRecordStore::new();
    let anchor = Node::new("anchor");
    heap::set_root(&anchor);
    let (a, b) = pair_cycle();
    let (ida, idb) = (a.id(), b.id());
    a.serialize(store_facility(&store)).unwrap();
    drop(a);
    drop(b);
    assert!(!heap::is_live(ida) && !heap::is_live(idb));

    // Cut the last reference off the head's record. Its partner loads
    // completely and points back at the head before the head fails.
    let good = store.get(&ida.key()).unwrap().unwrap();
    store.put(&ida.key(), &good[..good.len() - 4]).unwrap();

    let mut head = Handle::<Pair>::placeholder(ida);
    let err = head.load(load_facility(&store)).unwrap_err();
    assert!(matches!(err, GraphError::Codec(_)));
    assert!(head.is_empty());
    assert!(!heap::is_live(ida));
    assert!(!heap::is_live(idb));

    store.put(&ida.key(), &good).unwrap();
    let mut calls = 0;
    let mut load = load_facility(&store);
    head.load(|key: &str| {
        calls += 1;
        load(key)
    })
    .unwrap();
    assert_eq!(calls, 2);
    let partner = head.borrow().left.clone();
    assert_eq!(partner.id(), idb);
    assert!(head.borrow().right.is_empty());
    let back: Handle<Pair> = partner.cast();
    assert!(back.borrow().left.ptr_eq(&head));
}

// ─── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn chains_round_trip(labels in prop::collection::vec("[a-z]{0,8}", 1..12), close in any::<bool>()) {
        setup();
        let store = InMemoryRecordStore::new();

        let nodes: Vec<_> = labels.iter().map(|l| Node::new(l)).collect();
        for pair in nodes.windows(2) {
            pair[0].borrow_mut().next = pair[1].clone();
        }
        if close {
            nodes[nodes.len() - 1].borrow_mut().next = nodes[0].clone();
        }
        let ids: Vec<_> = nodes.iter().map(|n| n.id()).collect();
        nodes[0].serialize(store_facility(&store)).unwrap();
        prop_assert_eq!(store.len(), nodes.len());
        drop(nodes);

        let mut head = Handle::<Node>::placeholder(ids[0]);
        head.load(load_facility(&store)).unwrap();
        let mut cursor = head.clone();
        for (label, id) in labels.iter().zip(&ids) {
            prop_assert_eq!(cursor.id(), *id);
            prop_assert_eq!(&cursor.borrow().label, label);
            let next = cursor.borrow().next.clone();
            cursor = next;
        }
        if close {
            prop_assert!(cursor.ptr_eq(&head));
        } else {
            prop_assert!(cursor.is_empty());
        }
    }
}
