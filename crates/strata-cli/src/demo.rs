//! The sample `Node` class and the `demo` walkthrough.

use std::sync::OnceLock;

use serde::Serialize;
use strata_graph::{
    heap, object, registry, Context, GraphReader, GraphResult, GraphWriter, Handle, Object,
};
use strata_store::{load_facility, store_facility, RecordStore};
use strata_types::RecordWriter;

/// A labelled node with one outgoing edge.
#[derive(Default)]
pub struct Node {
    pub label: String,
    pub next: Handle<Node>,
}

object!(Node as "strata.demo.Node");

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

/// Register the sample classes. Safe to call more than once.
pub fn register() -> anyhow::Result<()> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| registry::register_class::<Node>().map_err(|err| err.to_string()))
        .clone()
        .map_err(anyhow::Error::msg)
}

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub ids: Vec<u32>,
    pub records_written: usize,
    pub live_after_unload: usize,
    pub records_loaded: usize,
    pub reloaded: Vec<String>,
    pub cycle_closed: bool,
}

/// Build a ring of `nodes` nodes, persist it into `store`, unload it, and
/// walk it again after loading from the head.
pub fn run<S: RecordStore>(store: &S, nodes: usize) -> anyhow::Result<DemoReport> {
    anyhow::ensure!(nodes > 0, "the demo ring needs at least one node");
    register()?;

    let ring: Vec<Handle<Node>> = (0..nodes)
        .map(|i| {
            Handle::new(Node {
                label: format!("node-{i}"),
                next: Handle::empty(),
            })
        })
        .collect();
    for (i, node) in ring.iter().enumerate() {
        node.borrow_mut().next = ring[(i + 1) % nodes].clone();
    }
    let ids = ring.iter().map(|node| node.id().id()).collect();
    let mut head = ring[0].clone();
    drop(ring);

    let mut ctx = Context::with_store(store_facility(store));
    strata_graph::serialize(&mut ctx, &mut RecordWriter::new(), &head)?;
    let records_written = ctx.records_written();
    drop(ctx);

    head.unload();
    let live_after_unload = heap::live_count();

    let mut records_loaded = 0;
    let mut fetch = load_facility(store);
    head.load(|key: &str| {
        records_loaded += 1;
        fetch(key)
    })?;

    let mut reloaded = Vec::with_capacity(nodes);
    let mut cursor = head.clone();
    let cycle_closed = loop {
        reloaded.push(cursor.borrow().label.clone());
        let next = cursor.borrow().next.clone();
        if next.ptr_eq(&head) {
            break true;
        }
        if next.is_empty() || reloaded.len() >= nodes {
            break false;
        }
        cursor = next;
    };

    Ok(DemoReport {
        ids,
        records_written,
        live_after_unload,
        records_loaded,
        reloaded,
        cycle_closed,
    })
}
