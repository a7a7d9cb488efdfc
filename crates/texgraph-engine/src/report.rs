//! Per-flush outcome summary.

use serde::Serialize;

use texgraph_core::NodeId;

use crate::backend::RenderError;

/// What one flush pass did with each planned node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlushReport {
    /// Nodes whose output was computed and cached, in completion order.
    pub computed: Vec<NodeId>,
    /// Nodes whose backend call failed. They keep their previous output.
    pub failed: Vec<(NodeId, RenderError)>,
    /// Nodes left Stale because an upstream node was not Clean.
    pub skipped: Vec<NodeId>,
    /// Nodes whose result was dropped because they were edited or deleted
    /// while computing.
    pub discarded: Vec<NodeId>,
}

impl FlushReport {
    /// Number of nodes the pass touched in any way.
    pub fn total(&self) -> usize {
        self.computed.len() + self.failed.len() + self.skipped.len() + self.discarded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Returns `true` if no planned node failed or was skipped.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn failed_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.failed.iter().map(|(node, _)| node)
    }
}
