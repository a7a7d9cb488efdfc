//! Core error types for texgraph-core.
//!
//! Uses `thiserror` for structured, matchable variants. Every validation
//! failure is reported before the store is touched, so an `Err` from a
//! mutating call always means the graph is unchanged.

use thiserror::Error;

use crate::id::{ConnectionId, NodeId};
use crate::type_id::TypeId;
use crate::types::ValueKind;

/// Errors produced by graph mutations and queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// A node with this id already exists.
    #[error("duplicate node id: '{id}'")]
    DuplicateId { id: NodeId },

    /// A connection with this id already exists.
    #[error("duplicate connection id: '{id}'")]
    DuplicateConnectionId { id: ConnectionId },

    /// The node id does not exist.
    #[error("node not found: '{id}'")]
    NotFound { id: NodeId },

    /// The connection id does not exist.
    #[error("connection not found: '{id}'")]
    ConnectionNotFound { id: ConnectionId },

    /// The type id could not be resolved.
    #[error("unknown type: '{id}'")]
    UnknownType { id: TypeId },

    /// A type with this id is already registered.
    #[error("duplicate type id: '{id}'")]
    DuplicateType { id: TypeId },

    /// The slot is not declared by the node's type.
    #[error("unknown slot '{slot}' on node '{node}'")]
    UnknownSlot { node: NodeId, slot: String },

    /// A literal value does not match the slot's value kind.
    #[error("slot '{slot}' on node '{node}' expects {expected:?}, got {found:?}")]
    KindMismatch {
        node: NodeId,
        slot: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// The destination input slot is already bound by another connection.
    #[error("input slot '{slot}' on node '{node}' is already bound by connection '{bound_by}'")]
    SlotOccupied {
        node: NodeId,
        slot: String,
        bound_by: ConnectionId,
    },

    /// Adding the connection would close a cycle.
    #[error("connecting '{from}' to '{to}' would create a cycle")]
    CycleDetected { from: NodeId, to: NodeId },

    /// An internal invariant was violated.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },
}
