//! Caller-supplied identifier newtypes for graph entities.
//!
//! Node and connection identifiers come from the editing layer (usually
//! UUID strings), so both wrap a `String`. They are distinct types so that a
//! `NodeId` cannot be passed where a `ConnectionId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique node identifier within a [`NodeGraph`](crate::graph::NodeGraph).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

/// Unique connection identifier within a [`NodeGraph`](crate::graph::NodeGraph).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ConnectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        ConnectionId(s.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        ConnectionId(s)
    }
}
