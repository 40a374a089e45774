//! Fixtures shared by the unit tests.

use std::sync::Once;

use crate::error::GraphResult;
use crate::handle::Handle;
use crate::object::Object;
use crate::protocol::{GraphReader, GraphWriter};
use crate::registry::register_class;
use crate::{capability, object};

/// A labelled node with one outgoing edge.
#[derive(Default)]
pub(crate) struct Node {
    pub(crate) label: String,
    pub(crate) next: Handle<Node>,
}

object!(Node);

impl Node {
    pub(crate) fn named(label: &str) -> Self {
        Self {
            label: label.to_string(),
            next: Handle::empty(),
        }
    }

    pub(crate) fn linked(label: &str, next: &Handle<Node>) -> Self {
        Self {
            label: label.to_string(),
            next: next.clone(),
        }
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

pub(crate) trait Shape: Object {
    fn area(&self) -> f64;
}

capability!(Shape);

#[derive(Default)]
pub(crate) struct Circle {
    pub(crate) radius: f64,
}

object!(Circle: dyn Shape);

impl Object for Circle {
    fn serialize_fields(&self, w: &mut GraphWriter<'_, '_>) -> GraphResult<()> {
        w.write(&self.radius)
    }

    fn deserialize_fields(&mut self, r: &mut GraphReader<'_, '_>) -> GraphResult<()> {
        self.radius = r.read()?;
        Ok(())
    }
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}

/// Register the fixture classes once per test binary.
pub(crate) fn setup() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        register_class::<Node>().expect("register Node");
        register_class::<Circle>().expect("register Circle");
    });
}
