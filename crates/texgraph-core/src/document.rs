//! Graph document: the JSON boundary for saving and restoring a graph.
//!
//! ```json
//! {
//!   "version": 1,
//!   "nodes": { "n1": { "type": "noise", "params": { "seed": 4 } } },
//!   "connections": {
//!     "c1": { "fromNodeId": "n1", "fromSlot": "out", "toNodeId": "n2", "toSlot": "a" }
//!   }
//! }
//! ```
//!
//! Only editable state is captured. Cached outputs, render targets and
//! staleness are runtime concerns and are rebuilt by the next flush.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::SlotRef;
use crate::error::GraphError;
use crate::graph::NodeGraph;
use crate::id::{ConnectionId, NodeId};
use crate::type_id::{TypeId, TypeProvider};
use crate::types::Params;

/// Newest document version this build reads and the one it writes.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Connections may only reference nodes declared in the same document.
    #[error("connection '{connection}' references node '{node}' which is not in the document")]
    ForeignNode { connection: ConnectionId, node: NodeId },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntry {
    #[serde(rename = "type")]
    pub type_id: TypeId,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEntry {
    pub from_node_id: NodeId,
    pub from_slot: String,
    pub to_node_id: NodeId,
    pub to_slot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    pub version: u32,
    #[serde(default)]
    pub nodes: IndexMap<NodeId, NodeEntry>,
    #[serde(default)]
    pub connections: IndexMap<ConnectionId, ConnectionEntry>,
}

impl Default for GraphDocument {
    fn default() -> Self {
        GraphDocument {
            version: DOCUMENT_VERSION,
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
        }
    }
}

impl GraphDocument {
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<A, T> NodeGraph<A, T> {
    /// Captures nodes and connections, each sorted by id.
    pub fn to_document(&self) -> GraphDocument {
        let mut nodes: Vec<(NodeId, NodeEntry)> = self
            .nodes()
            .map(|node| {
                (
                    node.id().clone(),
                    NodeEntry {
                        type_id: node.type_id().clone(),
                        params: node.params().clone(),
                    },
                )
            })
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut connections: Vec<(ConnectionId, ConnectionEntry)> = self
            .connections()
            .map(|conn| {
                (
                    conn.id.clone(),
                    ConnectionEntry {
                        from_node_id: conn.from.node.clone(),
                        from_slot: conn.from.slot.clone(),
                        to_node_id: conn.to.node.clone(),
                        to_slot: conn.to.slot.clone(),
                    },
                )
            })
            .collect();
        connections.sort_by(|a, b| a.0.cmp(&b.0));

        GraphDocument {
            version: DOCUMENT_VERSION,
            nodes: nodes.into_iter().collect(),
            connections: connections.into_iter().collect(),
        }
    }

    /// Adds every node, then every connection, of `doc` to this graph.
    ///
    /// All-or-nothing: on error the nodes created so far are deleted again,
    /// which also removes any connections made between them. Returns the ids
    /// of the loaded nodes in document order; all of them are Stale.
    pub fn load_document(
        &mut self,
        doc: &GraphDocument,
        types: &dyn TypeProvider,
    ) -> Result<Vec<NodeId>, DocumentError> {
        if doc.version > DOCUMENT_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                found: doc.version,
                supported: DOCUMENT_VERSION,
            });
        }
        for (conn_id, entry) in &doc.connections {
            for node in [&entry.from_node_id, &entry.to_node_id] {
                if !doc.nodes.contains_key(node) {
                    return Err(DocumentError::ForeignNode {
                        connection: conn_id.clone(),
                        node: node.clone(),
                    });
                }
            }
        }

        let mut created = Vec::with_capacity(doc.nodes.len());
        let result = self.apply_document(doc, types, &mut created);
        if let Err(err) = result {
            for id in created.iter().rev() {
                // Created in this call, so deletion cannot fail.
                let _ = self.delete_node(id);
            }
            return Err(err);
        }
        Ok(created)
    }

    fn apply_document(
        &mut self,
        doc: &GraphDocument,
        types: &dyn TypeProvider,
        created: &mut Vec<NodeId>,
    ) -> Result<(), DocumentError> {
        for (id, entry) in &doc.nodes {
            self.create_node(types, id.clone(), &entry.type_id, entry.params.clone())?;
            created.push(id.clone());
        }
        for (id, entry) in &doc.connections {
            self.create_connection(
                id.clone(),
                SlotRef {
                    node: entry.from_node_id.clone(),
                    slot: entry.from_slot.clone(),
                },
                SlotRef {
                    node: entry.to_node_id.clone(),
                    slot: entry.to_slot.clone(),
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeState;
    use crate::type_id::TypeRegistry;
    use crate::types::{ParamValue, SlotDef, TypeDescriptor};

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register(TypeDescriptor::new("noise", "Noise", "noise").with_input(SlotDef::number("seed", 0.0)))
            .unwrap();
        registry
            .register(
                TypeDescriptor::new("blend", "Blend", "blend")
                    .with_input(SlotDef::texture("a"))
                    .with_input(SlotDef::texture("b"))
                    .with_input(SlotDef::number("mix", 0.5)),
            )
            .unwrap();
        registry
    }

    const DOC: &str = r#"{
        "version": 1,
        "nodes": {
            "n1": { "type": "noise", "params": { "seed": 4 } },
            "n2": { "type": "noise" },
            "mix": { "type": "blend", "params": { "mix": 0.25 } }
        },
        "connections": {
            "c1": { "fromNodeId": "n1", "fromSlot": "out", "toNodeId": "mix", "toSlot": "a" },
            "c2": { "fromNodeId": "n2", "fromSlot": "out", "toNodeId": "mix", "toSlot": "b" }
        }
    }"#;

    #[test]
    fn load_creates_stale_nodes_and_connections() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        let doc = GraphDocument::from_json(DOC).unwrap();
        let loaded = graph.load_document(&doc, &types).unwrap();

        assert_eq!(
            loaded,
            vec![NodeId::from("n1"), NodeId::from("n2"), NodeId::from("mix")]
        );
        assert_eq!(graph.connection_count(), 2);
        assert_eq!(graph.nodes_in_state(NodeState::Stale).len(), 3);
        assert_eq!(
            graph.node(&NodeId::from("n2")).unwrap().param("seed"),
            Some(&ParamValue::Number(0.0))
        );
    }

    #[test]
    fn export_is_sorted_and_reloadable() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        graph
            .load_document(&GraphDocument::from_json(DOC).unwrap(), &types)
            .unwrap();

        let exported = graph.to_document();
        let ids: Vec<&str> = exported.nodes.keys().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["mix", "n1", "n2"]);
        assert_eq!(exported.connections[&ConnectionId::from("c2")].to_slot, "b");

        let json = exported.to_json_pretty().unwrap();
        assert!(json.contains("\"fromNodeId\""));
        let mut copy: NodeGraph<u32> = NodeGraph::new();
        copy.load_document(&GraphDocument::from_json(&json).unwrap(), &types)
            .unwrap();
        assert_eq!(copy.to_document(), exported);
    }

    #[test]
    fn newer_version_is_rejected() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        let doc = GraphDocument {
            version: DOCUMENT_VERSION + 1,
            ..GraphDocument::default()
        };
        assert!(matches!(
            graph.load_document(&doc, &types),
            Err(DocumentError::UnsupportedVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn failed_load_leaves_graph_unchanged() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        graph
            .create_node(&types, NodeId::from("keep"), &TypeId::from("noise"), Params::new())
            .unwrap();

        // Second connection targets an occupied slot.
        let mut doc = GraphDocument::from_json(DOC).unwrap();
        doc.connections.insert(
            ConnectionId::from("c3"),
            ConnectionEntry {
                from_node_id: NodeId::from("n2"),
                from_slot: "out".into(),
                to_node_id: NodeId::from("mix"),
                to_slot: "a".into(),
            },
        );
        assert!(matches!(
            graph.load_document(&doc, &types),
            Err(DocumentError::Graph(GraphError::SlotOccupied { .. }))
        ));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.connection_count(), 0);

        // Unknown type halfway through node creation.
        let mut doc = GraphDocument::from_json(DOC).unwrap();
        doc.nodes.insert(
            NodeId::from("bad"),
            NodeEntry {
                type_id: TypeId::from("missing"),
                params: Params::new(),
            },
        );
        assert!(matches!(
            graph.load_document(&doc, &types),
            Err(DocumentError::Graph(GraphError::UnknownType { .. }))
        ));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn duplicate_ids_and_foreign_nodes_are_rejected() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        graph
            .create_node(&types, NodeId::from("n2"), &TypeId::from("noise"), Params::new())
            .unwrap();
        let doc = GraphDocument::from_json(DOC).unwrap();
        assert!(matches!(
            graph.load_document(&doc, &types),
            Err(DocumentError::Graph(GraphError::DuplicateId { .. }))
        ));
        assert_eq!(graph.node_count(), 1);

        let mut doc = GraphDocument::default();
        doc.connections.insert(
            ConnectionId::from("c"),
            ConnectionEntry {
                from_node_id: NodeId::from("n2"),
                from_slot: "out".into(),
                to_node_id: NodeId::from("elsewhere"),
                to_slot: "a".into(),
            },
        );
        assert!(matches!(
            graph.load_document(&doc, &types),
            Err(DocumentError::ForeignNode { .. })
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            GraphDocument::from_json("{\"version\": \"one\"}"),
            Err(DocumentError::Json(_))
        ));
    }
}
