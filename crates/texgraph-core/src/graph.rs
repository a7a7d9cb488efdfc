//! NodeGraph: the node store, connection store and dependency graph in one
//! container.
//!
//! [`NodeGraph`] keeps nodes and connections in a petgraph `StableGraph`
//! (node weight = [`Node`], edge weight = [`Connection`], edge direction =
//! upstream → downstream) plus id → index maps for the caller-supplied
//! identifiers. All mutations go through `NodeGraph` methods so that the
//! structural invariants hold after every call:
//!
//! - every input slot is bound by at most one connection;
//! - the graph is acyclic;
//! - both endpoints of every connection exist;
//! - a node is non-Clean whenever any of its upstream nodes is non-Clean.
//!
//! Validation runs before anything is written, so a failed call leaves the
//! graph unchanged. Staleness propagates eagerly: every mutation that can
//! change a node's effective inputs marks that node and everything reachable
//! downstream of it Stale before returning.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::{Directed, Direction};

use crate::connection::{Connection, SlotRef};
use crate::error::GraphError;
use crate::id::{ConnectionId, NodeId};
use crate::node::{EffectiveInputs, InputValue, Node, NodeState};
use crate::type_id::{TypeId, TypeProvider};
use crate::types::{ParamValue, Params};

/// A node removed by [`NodeGraph::delete_node`], together with the
/// connections that were cascaded away with it.
///
/// Dropping this value releases the node's render target and cached output.
#[derive(Debug)]
pub struct RemovedNode<A, T> {
    pub node: Node<A, T>,
    pub connections: Vec<Connection>,
}

/// The mutable dependency graph.
#[derive(Debug)]
pub struct NodeGraph<A, T = ()> {
    pub(crate) graph: StableGraph<Node<A, T>, Connection, Directed, u32>,
    pub(crate) nodes: HashMap<NodeId, NodeIndex<u32>>,
    connections: HashMap<ConnectionId, EdgeIndex<u32>>,
    /// Monotonic staleness stamp shared by all nodes.
    last_revision: u64,
}

impl<A, T> Default for NodeGraph<A, T> {
    fn default() -> Self {
        NodeGraph {
            graph: StableGraph::default(),
            nodes: HashMap::new(),
            connections: HashMap::new(),
            last_revision: 0,
        }
    }
}

impl<A, T> NodeGraph<A, T> {
    pub fn new() -> Self {
        NodeGraph::default()
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn node(&self, id: &NodeId) -> Option<&Node<A, T>> {
        self.nodes.get(id).map(|&ix| &self.graph[ix])
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// The cached output of `id`. `None` both for unknown nodes and for nodes
    /// that have never produced an output.
    pub fn output(&self, id: &NodeId) -> Option<Arc<A>> {
        self.node(id).and_then(|node| node.output().cloned())
    }

    pub fn state(&self, id: &NodeId) -> Option<NodeState> {
        self.node(id).map(Node::state)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node<A, T>> {
        self.graph.node_indices().map(move |ix| &self.graph[ix])
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections
            .get(id)
            .and_then(|&ix| self.graph.edge_weight(ix))
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.graph
            .edge_indices()
            .filter_map(move |ix| self.graph.edge_weight(ix))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// The connection currently bound to `node`'s input `slot`, if any.
    pub fn binding(&self, node: &NodeId, slot: &str) -> Option<&Connection> {
        let ix = *self.nodes.get(node)?;
        self.graph
            .edges_directed(ix, Direction::Incoming)
            .map(|edge| edge.weight())
            .find(|conn| conn.to.slot == slot)
    }

    /// Ids of all nodes currently in the given state, sorted.
    pub fn nodes_in_state(&self, state: NodeState) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes()
            .filter(|node| node.state() == state)
            .map(|node| node.id().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Returns `true` if any node is waiting for a flush.
    pub fn has_stale(&self) -> bool {
        self.nodes().any(|node| node.state() == NodeState::Stale)
    }

    /// Returns `true` if the dependency graph has no cycle.
    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    // -----------------------------------------------------------------------
    // Node store
    // -----------------------------------------------------------------------

    /// Registers a new node of type `type_id`.
    ///
    /// `params` override the type's slot defaults. The node starts Stale.
    pub fn create_node(
        &mut self,
        types: &dyn TypeProvider,
        id: NodeId,
        type_id: &TypeId,
        params: Params,
    ) -> Result<(), GraphError> {
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateId { id });
        }
        let descriptor = types
            .get_type(type_id)
            .ok_or_else(|| GraphError::UnknownType {
                id: type_id.clone(),
            })?;

        for (name, value) in &params {
            let slot = descriptor.input(name).ok_or_else(|| GraphError::UnknownSlot {
                node: id.clone(),
                slot: name.clone(),
            })?;
            if !slot.accepts(value) {
                return Err(GraphError::KindMismatch {
                    node: id.clone(),
                    slot: name.clone(),
                    expected: slot.kind,
                    found: value.kind(),
                });
            }
        }

        let mut merged = descriptor.default_params();
        merged.extend(params);

        let revision = self.bump_revision();
        let ix = self
            .graph
            .add_node(Node::new(id.clone(), descriptor, merged, revision));
        self.nodes.insert(id, ix);
        Ok(())
    }

    /// Removes a node and every connection touching it.
    ///
    /// Nodes that were fed by the removed node fall back to their literals
    /// and are marked Stale.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<RemovedNode<A, T>, GraphError> {
        let ix = self.index(id)?;

        let downstream: Vec<NodeIndex<u32>> = self
            .graph
            .edges_directed(ix, Direction::Outgoing)
            .map(|edge| edge.target())
            .collect();
        let touching: Vec<EdgeIndex<u32>> = self
            .graph
            .edges_directed(ix, Direction::Outgoing)
            .chain(self.graph.edges_directed(ix, Direction::Incoming))
            .map(|edge| edge.id())
            .collect();

        let mut connections = Vec::with_capacity(touching.len());
        for edge in touching {
            if let Some(conn) = self.graph.remove_edge(edge) {
                self.connections.remove(&conn.id);
                connections.push(conn);
            }
        }

        let node = self
            .graph
            .remove_node(ix)
            .ok_or_else(|| GraphError::GraphInconsistency {
                reason: format!("node '{}' has an index but no weight", id),
            })?;
        self.nodes.remove(id);

        for target in downstream {
            self.invalidate(target);
        }

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(RemovedNode { node, connections })
    }

    /// Updates one literal parameter and invalidates the node.
    pub fn set_parameter(
        &mut self,
        id: &NodeId,
        name: &str,
        value: ParamValue,
    ) -> Result<(), GraphError> {
        let ix = self.index(id)?;
        let descriptor = Arc::clone(self.graph[ix].descriptor());
        let slot = descriptor.input(name).ok_or_else(|| GraphError::UnknownSlot {
            node: id.clone(),
            slot: name.to_string(),
        })?;
        if !slot.accepts(&value) {
            return Err(GraphError::KindMismatch {
                node: id.clone(),
                slot: name.to_string(),
                expected: slot.kind,
                found: value.kind(),
            });
        }

        self.graph[ix].set_param(name.to_string(), value);
        self.invalidate(ix);
        Ok(())
    }

    /// Attaches (or with `None`, detaches) the node's render target and
    /// returns the handle it replaced.
    pub fn set_render_target(
        &mut self,
        id: &NodeId,
        target: Option<T>,
    ) -> Result<Option<Arc<T>>, GraphError> {
        let ix = self.index(id)?;
        let previous = self.graph[ix].set_target(target.map(Arc::new));
        self.invalidate(ix);
        Ok(previous)
    }

    /// Requests recomputation of a node.
    ///
    /// A Stale or Computing node is already included in the next pass, so
    /// this is a no-op for them and returns `false`. Clean and Failed nodes
    /// are invalidated together with their downstream nodes.
    pub fn schedule(&mut self, id: &NodeId) -> Result<bool, GraphError> {
        let ix = self.index(id)?;
        match self.graph[ix].state() {
            NodeState::Stale | NodeState::Computing => Ok(false),
            NodeState::Clean | NodeState::Failed => {
                self.invalidate(ix);
                Ok(true)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Connection store
    // -----------------------------------------------------------------------

    /// Binds `from` (an output slot) to `to` (an input slot).
    ///
    /// Checks, in order: connection id is new, both nodes exist, `to.slot`
    /// is a declared input and `from.slot` the declared output, the input is
    /// not already bound, and the edge does not close a cycle.
    pub fn create_connection(
        &mut self,
        id: ConnectionId,
        from: SlotRef,
        to: SlotRef,
    ) -> Result<(), GraphError> {
        if self.connections.contains_key(&id) {
            return Err(GraphError::DuplicateConnectionId { id });
        }
        let from_ix = self.index(&from.node)?;
        let to_ix = self.index(&to.node)?;

        if self.graph[to_ix].descriptor().input(&to.slot).is_none() {
            return Err(GraphError::UnknownSlot {
                node: to.node,
                slot: to.slot,
            });
        }
        if !self.graph[from_ix].descriptor().has_output(&from.slot) {
            return Err(GraphError::UnknownSlot {
                node: from.node,
                slot: from.slot,
            });
        }

        if let Some(existing) = self.binding(&to.node, &to.slot) {
            return Err(GraphError::SlotOccupied {
                node: to.node.clone(),
                slot: to.slot.clone(),
                bound_by: existing.id.clone(),
            });
        }

        // The new edge closes a cycle iff `from` is already reachable from `to`.
        if from_ix == to_ix || has_path_connecting(&self.graph, to_ix, from_ix, None) {
            return Err(GraphError::CycleDetected {
                from: from.node,
                to: to.node,
            });
        }

        let edge = self.graph.add_edge(
            from_ix,
            to_ix,
            Connection {
                id: id.clone(),
                from,
                to,
            },
        );
        self.connections.insert(id, edge);
        self.invalidate(to_ix);

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(())
    }

    /// Removes a connection; its former destination falls back to its literal.
    pub fn delete_connection(&mut self, id: &ConnectionId) -> Result<Connection, GraphError> {
        let edge = *self
            .connections
            .get(id)
            .ok_or_else(|| GraphError::ConnectionNotFound { id: id.clone() })?;
        let target = self
            .graph
            .edge_endpoints(edge)
            .map(|(_, target)| target)
            .ok_or_else(|| GraphError::GraphInconsistency {
                reason: format!("connection '{}' has an index but no edge", id),
            })?;
        let conn = self
            .graph
            .remove_edge(edge)
            .ok_or_else(|| GraphError::GraphInconsistency {
                reason: format!("connection '{}' has an index but no weight", id),
            })?;
        self.connections.remove(id);
        self.invalidate(target);
        Ok(conn)
    }

    // -----------------------------------------------------------------------
    // Effective inputs
    // -----------------------------------------------------------------------

    /// Resolves every declared input slot of `id`.
    ///
    /// A bound slot yields the upstream output when the upstream node is
    /// Clean; otherwise (and for unbound slots) the node's literal is used.
    pub fn effective_inputs(&self, id: &NodeId) -> Result<EffectiveInputs<A>, GraphError> {
        let ix = self.index(id)?;
        Ok(self.inputs_at(ix))
    }

    pub(crate) fn inputs_at(&self, ix: NodeIndex<u32>) -> EffectiveInputs<A> {
        let node = &self.graph[ix];
        let mut values = IndexMap::with_capacity(node.descriptor().inputs.len());

        for slot in &node.descriptor().inputs {
            let upstream = self
                .graph
                .edges_directed(ix, Direction::Incoming)
                .find(|edge| edge.weight().to.slot == slot.name)
                .map(|edge| &self.graph[edge.source()])
                .filter(|source| source.is_clean())
                .and_then(|source| source.output());

            let value = match upstream {
                Some(artifact) => InputValue::Artifact(Arc::clone(artifact)),
                None => match node.param(&slot.name) {
                    Some(literal) => InputValue::Literal(literal.clone()),
                    None => InputValue::Unset,
                },
            };
            values.insert(slot.name.clone(), value);
        }

        EffectiveInputs::new(values)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    pub(crate) fn index(&self, id: &NodeId) -> Result<NodeIndex<u32>, GraphError> {
        self.nodes
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::NotFound { id: id.clone() })
    }

    fn bump_revision(&mut self) -> u64 {
        self.last_revision += 1;
        self.last_revision
    }

    /// Marks `start` and everything downstream of it Stale under a fresh
    /// revision. Returns the number of nodes marked.
    pub(crate) fn invalidate(&mut self, start: NodeIndex<u32>) -> usize {
        let revision = self.bump_revision();
        let mut reached = Vec::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(ix) = dfs.next(&self.graph) {
            reached.push(ix);
        }
        for &ix in &reached {
            self.graph[ix].mark_stale(revision);
        }
        reached.len()
    }

    /// Verifies that the id maps and the petgraph storage agree.
    ///
    /// Only called in debug builds (via `cfg(debug_assertions)`).
    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        assert_eq!(self.nodes.len(), self.graph.node_count());
        assert_eq!(self.connections.len(), self.graph.edge_count());
        for (id, &ix) in &self.nodes {
            assert_eq!(
                self.graph.node_weight(ix).map(Node::id),
                Some(id),
                "node map entry {:?} points at a different weight",
                id
            );
        }
        for (id, &ix) in &self.connections {
            assert_eq!(
                self.graph.edge_weight(ix).map(|conn| &conn.id),
                Some(id),
                "connection map entry {:?} points at a different weight",
                id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_id::TypeRegistry;
    use crate::types::{SlotDef, TypeDescriptor, ValueKind};

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

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn add(graph: &mut NodeGraph<u32>, types: &TypeRegistry, name: &str, ty: &str) {
        graph
            .create_node(types, id(name), &TypeId::from(ty), Params::new())
            .unwrap();
    }

    fn connect(graph: &mut NodeGraph<u32>, conn: &str, from: &str, to: &str, slot: &str) -> Result<(), GraphError> {
        graph.create_connection(
            ConnectionId::from(conn),
            SlotRef::new(from, "out"),
            SlotRef::new(to, slot),
        )
    }

    /// Forces every node Clean with a dummy output.
    fn settle(graph: &mut NodeGraph<u32>) {
        for ix in graph.graph.node_indices().collect::<Vec<_>>() {
            graph.graph[ix].store_output(Arc::new(1));
        }
    }

    #[test]
    fn create_node_applies_defaults_and_overrides() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        let mut params = Params::new();
        params.insert("mix".into(), ParamValue::Number(0.9));
        graph
            .create_node(&types, id("m"), &TypeId::from("blend"), params)
            .unwrap();

        let node = graph.node(&id("m")).unwrap();
        assert_eq!(node.param("mix"), Some(&ParamValue::Number(0.9)));
        assert_eq!(node.state(), NodeState::Stale);
        assert!(graph.output(&id("m")).is_none());
    }

    #[test]
    fn create_node_rejects_duplicate_before_unknown_type() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        add(&mut graph, &types, "n", "noise");

        let err = graph
            .create_node(&types, id("n"), &TypeId::from("nope"), Params::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateId { .. }));

        let err = graph
            .create_node(&types, id("x"), &TypeId::from("nope"), Params::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownType { .. }));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn create_node_validates_params() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();

        let mut params = Params::new();
        params.insert("nope".into(), ParamValue::Number(1.0));
        let err = graph
            .create_node(&types, id("n"), &TypeId::from("noise"), params)
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownSlot { .. }));

        let mut params = Params::new();
        params.insert("seed".into(), ParamValue::Bool(true));
        let err = graph
            .create_node(&types, id("n"), &TypeId::from("noise"), params)
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::KindMismatch {
                node: id("n"),
                slot: "seed".into(),
                expected: ValueKind::Number,
                found: ValueKind::Boolean,
            }
        );
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn set_parameter_validates_and_invalidates_downstream() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        add(&mut graph, &types, "n", "noise");
        add(&mut graph, &types, "m", "blend");
        connect(&mut graph, "c", "n", "m", "a").unwrap();
        settle(&mut graph);

        assert!(matches!(
            graph.set_parameter(&id("n"), "bogus", ParamValue::Number(1.0)),
            Err(GraphError::UnknownSlot { .. })
        ));
        assert!(matches!(
            graph.set_parameter(&id("missing"), "seed", ParamValue::Number(1.0)),
            Err(GraphError::NotFound { .. })
        ));
        assert!(matches!(
            graph.set_parameter(&id("m"), "a", ParamValue::Number(1.0)),
            Err(GraphError::KindMismatch { .. })
        ));
        assert_eq!(graph.state(&id("n")), Some(NodeState::Clean));

        graph
            .set_parameter(&id("n"), "seed", ParamValue::Number(5.0))
            .unwrap();
        assert_eq!(graph.state(&id("n")), Some(NodeState::Stale));
        assert_eq!(graph.state(&id("m")), Some(NodeState::Stale));
    }

    #[test]
    fn connection_validation_order() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        add(&mut graph, &types, "n", "noise");
        add(&mut graph, &types, "m", "blend");

        assert!(matches!(
            connect(&mut graph, "c", "ghost", "m", "a"),
            Err(GraphError::NotFound { .. })
        ));
        // Bad destination slot is reported before a bad source slot.
        match graph.create_connection(
            ConnectionId::from("c"),
            SlotRef::new("n", "wrong"),
            SlotRef::new("m", "zzz"),
        ) {
            Err(GraphError::UnknownSlot { node, slot }) => {
                assert_eq!(node, id("m"));
                assert_eq!(slot, "zzz");
            }
            other => panic!("expected UnknownSlot, got {:?}", other),
        }
        assert!(matches!(
            graph.create_connection(
                ConnectionId::from("c"),
                SlotRef::new("n", "wrong"),
                SlotRef::new("m", "a"),
            ),
            Err(GraphError::UnknownSlot { .. })
        ));

        connect(&mut graph, "c1", "n", "m", "a").unwrap();
        assert!(matches!(
            connect(&mut graph, "c1", "n", "m", "b"),
            Err(GraphError::DuplicateConnectionId { .. })
        ));
        match connect(&mut graph, "c2", "n", "m", "a") {
            Err(GraphError::SlotOccupied { bound_by, .. }) => {
                assert_eq!(bound_by, ConnectionId::from("c1"))
            }
            other => panic!("expected SlotOccupied, got {:?}", other),
        }
        assert_eq!(graph.connection_count(), 1);
    }

    #[test]
    fn cycles_are_rejected() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        add(&mut graph, &types, "x", "blend");
        add(&mut graph, &types, "y", "blend");
        add(&mut graph, &types, "z", "blend");
        connect(&mut graph, "xy", "x", "y", "a").unwrap();
        connect(&mut graph, "yz", "y", "z", "a").unwrap();

        assert!(matches!(
            connect(&mut graph, "zx", "z", "x", "a"),
            Err(GraphError::CycleDetected { .. })
        ));
        assert!(matches!(
            connect(&mut graph, "xx", "x", "x", "b"),
            Err(GraphError::CycleDetected { .. })
        ));
        assert_eq!(graph.connection_count(), 2);
        assert!(graph.is_acyclic());
        // A second path in the same direction is fine.
        connect(&mut graph, "xz", "x", "z", "b").unwrap();
    }

    #[test]
    fn delete_node_cascades_connections_and_invalidates_dependents() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        add(&mut graph, &types, "n", "noise");
        add(&mut graph, &types, "m", "blend");
        add(&mut graph, &types, "o", "blend");
        connect(&mut graph, "nm", "n", "m", "a").unwrap();
        connect(&mut graph, "mo", "m", "o", "a").unwrap();
        settle(&mut graph);

        let removed = graph.delete_node(&id("n")).unwrap();
        assert_eq!(removed.connections.len(), 1);
        assert_eq!(removed.connections[0].id, ConnectionId::from("nm"));
        assert!(graph.connection(&ConnectionId::from("nm")).is_none());
        assert!(graph.binding(&id("m"), "a").is_none());
        assert_eq!(graph.state(&id("m")), Some(NodeState::Stale));
        assert_eq!(graph.state(&id("o")), Some(NodeState::Stale));

        assert!(matches!(
            graph.delete_node(&id("n")),
            Err(GraphError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_connection_invalidates_destination_only() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        add(&mut graph, &types, "n", "noise");
        add(&mut graph, &types, "m", "blend");
        connect(&mut graph, "nm", "n", "m", "a").unwrap();
        settle(&mut graph);

        let conn = graph.delete_connection(&ConnectionId::from("nm")).unwrap();
        assert_eq!(conn.from.node, id("n"));
        assert_eq!(graph.state(&id("n")), Some(NodeState::Clean));
        assert_eq!(graph.state(&id("m")), Some(NodeState::Stale));
        assert!(matches!(
            graph.delete_connection(&ConnectionId::from("nm")),
            Err(GraphError::ConnectionNotFound { .. })
        ));
    }

    #[test]
    fn staleness_propagates_transitively_but_not_upstream() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        for name in ["a", "b", "c", "d"] {
            add(&mut graph, &types, name, "blend");
        }
        add(&mut graph, &types, "side", "noise");
        connect(&mut graph, "ab", "a", "b", "a").unwrap();
        connect(&mut graph, "bc", "b", "c", "a").unwrap();
        connect(&mut graph, "cd", "c", "d", "a").unwrap();
        settle(&mut graph);

        graph.schedule(&id("b")).unwrap();
        assert_eq!(graph.state(&id("a")), Some(NodeState::Clean));
        assert_eq!(graph.state(&id("side")), Some(NodeState::Clean));
        assert_eq!(
            graph.nodes_in_state(NodeState::Stale),
            vec![id("b"), id("c"), id("d")]
        );
    }

    #[test]
    fn schedule_is_idempotent_for_pending_nodes() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        add(&mut graph, &types, "n", "noise");
        settle(&mut graph);

        assert!(graph.schedule(&id("n")).unwrap());
        let revision = graph.node(&id("n")).unwrap().revision();
        assert!(!graph.schedule(&id("n")).unwrap());
        assert_eq!(graph.node(&id("n")).unwrap().revision(), revision);
    }

    #[test]
    fn effective_inputs_prefer_clean_upstream_output() {
        let types = registry();
        let mut graph: NodeGraph<u32> = NodeGraph::new();
        add(&mut graph, &types, "n", "noise");
        add(&mut graph, &types, "m", "blend");
        connect(&mut graph, "nm", "n", "m", "b").unwrap();

        // Upstream not computed yet: texture slot is unset.
        let inputs = graph.effective_inputs(&id("m")).unwrap();
        assert!(matches!(inputs.get("b"), Some(InputValue::Unset)));
        assert_eq!(inputs.number("mix"), Some(0.5));

        settle(&mut graph);
        let inputs = graph.effective_inputs(&id("m")).unwrap();
        assert_eq!(inputs.artifact("b").map(|a| **a), Some(1));
        assert!(matches!(inputs.get("a"), Some(InputValue::Unset)));
    }

    #[test]
    fn render_target_replacement_returns_previous() {
        let types = registry();
        let mut graph: NodeGraph<u32, String> = NodeGraph::new();
        graph
            .create_node(&types, id("n"), &TypeId::from("noise"), Params::new())
            .unwrap();

        assert!(graph
            .set_render_target(&id("n"), Some("first".into()))
            .unwrap()
            .is_none());
        let previous = graph
            .set_render_target(&id("n"), Some("second".into()))
            .unwrap();
        assert_eq!(previous.as_deref().map(String::as_str), Some("first"));
        assert_eq!(
            graph
                .node(&id("n"))
                .and_then(|n| n.render_target())
                .map(|t| t.as_str()),
            Some("second")
        );
    }
}
