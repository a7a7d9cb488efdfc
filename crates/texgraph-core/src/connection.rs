//! Connections between node slots.
//!
//! A [`Connection`] binds one upstream output slot to one downstream input
//! slot. Connections are the edge weights of the dependency graph; they are
//! never updated in place, only deleted and recreated.

use serde::{Deserialize, Serialize};

use crate::id::{ConnectionId, NodeId};

/// One end of a connection: a node and one of its slot names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub node: NodeId,
    pub slot: String,
}

impl SlotRef {
    pub fn new(node: impl Into<NodeId>, slot: &str) -> Self {
        SlotRef {
            node: node.into(),
            slot: slot.to_string(),
        }
    }
}

/// A directed binding from `from` (an output slot) to `to` (an input slot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub from: SlotRef,
    pub to: SlotRef,
}

impl Connection {
    /// Returns `true` if either end of this connection is `node`.
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.from.node == node || &self.to.node == node
    }
}
