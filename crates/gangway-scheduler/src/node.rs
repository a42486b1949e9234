//! Node candidates consumed by the ranking kernel

use std::sync::Arc;

use crate::resource::ResourceVector;

/// Capacity view of a single node.
///
/// The ranking kernel never looks inside; candidates are compared by handle
/// identity (`Arc::ptr_eq`), not by value.
#[derive(Clone, Debug, Default)]
pub struct NodeInfo {
    /// Node name
    pub name: String,
    /// Allocatable capacity
    pub allocatable: ResourceVector,
    /// Resources requested by tasks already bound to the node
    pub used: ResourceVector,
}

/// Shared handle to a node candidate
pub type NodeHandle = Arc<NodeInfo>;

impl NodeInfo {
    /// Create a node with nothing bound to it
    pub fn new(name: impl Into<String>, allocatable: ResourceVector) -> Self {
        Self {
            name: name.into(),
            allocatable,
            used: ResourceVector::empty(),
        }
    }

    /// Unused capacity, floored at zero in every dimension
    pub fn idle(&self) -> ResourceVector {
        let mut idle = self.allocatable.clone();
        idle.sub(&self.used);
        idle
    }

    /// Account for a task bound to this node
    pub fn add_task(&mut self, request: &ResourceVector) {
        self.used.add(request);
    }

    /// Wrap into a shareable handle
    pub fn into_handle(self) -> NodeHandle {
        Arc::new(self)
    }
}

/// Identity comparison for node handles
pub fn same_node(a: &NodeHandle, b: &NodeHandle) -> bool {
    Arc::ptr_eq(a, b)
}
