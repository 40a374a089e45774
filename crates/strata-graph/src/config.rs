use serde::{Deserialize, Serialize};

/// How the heap picks its root object.
///
/// The root anchors cycle collection: everything reachable from it survives
/// a release.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootPolicy {
    /// The first object created while no root exists becomes the root.
    #[default]
    FirstObject,
    /// The root is only set through [`set_root`](crate::heap::set_root).
    Explicit,
}

/// Configuration for the per-thread object heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Run the cycle-breaking scan when a handle is released. When off,
    /// releases only decrement reference counts and cycles stay alive until
    /// [`collect_garbage`](crate::heap::collect_garbage) runs.
    pub collect_cycles: bool,
    /// Root selection.
    pub root_policy: RootPolicy,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            collect_cycles: true,
            root_policy: RootPolicy::FirstObject,
        }
    }
}
