//! Flush planning and the compute hand-off protocol.
//!
//! A flush pass works in three steps against [`NodeGraph`]:
//!
//! 1. [`NodeGraph::flush_plan`] takes the Stale subgraph (Stale nodes plus
//!    the edges between them) and orders it topologically. Each
//!    [`PlanStep`] lists the unfinished upstream nodes it must wait for.
//! 2. For each step whose waits are over (see [`ReadyTracker`]),
//!    [`NodeGraph::begin_compute`] admits the node: it must still be Stale
//!    and every bound upstream must be Clean. Admission moves it to
//!    Computing and hands out a [`ComputeJob`] snapshot (type, effective
//!    inputs, render target) that can cross a suspension point without
//!    holding the graph.
//! 3. [`NodeGraph::finish_compute`] / [`NodeGraph::fail_compute`] write the
//!    outcome back, but only if the node still exists and still carries the
//!    revision stamped on the job. Anything else is discarded.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use petgraph::visit::{EdgeRef, NodeFiltered};
use petgraph::Direction;
use smallvec::SmallVec;

use crate::error::GraphError;
use crate::graph::NodeGraph;
use crate::id::NodeId;
use crate::node::{EffectiveInputs, NodeState};
use crate::types::TypeDescriptor;

/// One node of a flush plan and the upstream nodes it waits for: those that
/// are Stale, or Computing in the pass that is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub node: NodeId,
    pub after: SmallVec<[NodeId; 4]>,
}

/// Topologically ordered Stale subgraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushPlan {
    steps: Vec<PlanStep>,
}

impl FlushPlan {
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Node ids in execution order.
    pub fn order(&self) -> Vec<&NodeId> {
        self.steps.iter().map(|step| &step.node).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Creates the dependency countdown used to drive this plan.
    pub fn tracker(&self) -> ReadyTracker {
        let mut tracker = ReadyTracker::default();
        tracker.extend(self);
        tracker
    }
}

/// Countdown of unfinished upstream dependencies per planned node.
///
/// A node becomes ready once every upstream it waits for has been reported
/// finished, whatever the outcome (computed, failed, skipped or discarded).
/// Waits on nodes the tracker never saw are ignored.
#[derive(Debug, Default)]
pub struct ReadyTracker {
    tracked: HashSet<NodeId>,
    pending: HashMap<NodeId, usize>,
    dependents: HashMap<NodeId, Vec<NodeId>>,
    ready: VecDeque<NodeId>,
    finished: HashSet<NodeId>,
}

impl ReadyTracker {
    /// Merges a fresh plan into a running countdown.
    ///
    /// Nodes not yet tracked, or tracked and already finished, are (re)added
    /// and wait for their open upstreams. Nodes still open keep their place;
    /// a waiting node additionally waits for upstreams added by this call.
    /// Returns the number of nodes added.
    pub fn extend(&mut self, plan: &FlushPlan) -> usize {
        let mut added: HashSet<NodeId> = HashSet::new();
        for step in &plan.steps {
            if self.is_open(&step.node) {
                let Some(count) = self.pending.get_mut(&step.node) else {
                    continue;
                };
                for upstream in step.after.iter().filter(|u| added.contains(*u)) {
                    *count += 1;
                    self.dependents
                        .entry(upstream.clone())
                        .or_default()
                        .push(step.node.clone());
                }
                continue;
            }

            let waits: SmallVec<[NodeId; 4]> = step
                .after
                .iter()
                .filter(|upstream| self.is_open(upstream))
                .cloned()
                .collect();
            self.tracked.insert(step.node.clone());
            self.finished.remove(&step.node);
            added.insert(step.node.clone());

            if waits.is_empty() {
                self.ready.push_back(step.node.clone());
            } else {
                self.pending.insert(step.node.clone(), waits.len());
            }
            for upstream in waits {
                self.dependents.entry(upstream).or_default().push(step.node.clone());
            }
        }
        added.len()
    }

    /// Next node whose dependencies are all finished, in plan order.
    pub fn pop_ready(&mut self) -> Option<NodeId> {
        self.ready.pop_front()
    }

    /// Reports `node` finished, releasing dependents whose last wait it was.
    /// Repeated reports for the same node are ignored.
    pub fn complete(&mut self, node: &NodeId) {
        if !self.tracked.contains(node) || !self.finished.insert(node.clone()) {
            return;
        }
        let Some(dependents) = self.dependents.remove(node) else {
            return;
        };
        for dependent in dependents {
            if let Some(count) = self.pending.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    self.pending.remove(&dependent);
                    self.ready.push_back(dependent);
                }
            }
        }
    }

    /// Returns `true` once every tracked node has been reported finished.
    pub fn is_finished(&self) -> bool {
        self.finished.len() == self.tracked.len()
    }

    fn is_open(&self, node: &NodeId) -> bool {
        self.tracked.contains(node) && !self.finished.contains(node)
    }
}

/// Everything a backend call needs, detached from the graph.
#[derive(Debug)]
pub struct ComputeJob<A, T> {
    pub node: NodeId,
    /// Revision the node carried at admission.
    pub revision: u64,
    pub descriptor: Arc<TypeDescriptor>,
    pub inputs: EffectiveInputs<A>,
    pub target: Option<Arc<T>>,
}

/// Outcome of [`NodeGraph::begin_compute`].
#[derive(Debug)]
pub enum Admission<A, T> {
    /// The node moved to Computing.
    Ready(ComputeJob<A, T>),
    /// A bound upstream node is not Clean; the node stays Stale.
    Blocked,
    /// The node was deleted or is no longer Stale.
    Gone,
}

/// What happened to a finished compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Output cached, node Clean.
    Stored,
    /// Node Failed, previous cache kept.
    Failed,
    /// The node was deleted or invalidated while computing; result dropped.
    Discarded,
}

impl<A, T> NodeGraph<A, T> {
    /// Orders the current Stale subgraph for execution.
    pub fn flush_plan(&self) -> Result<FlushPlan, GraphError> {
        let stale: HashSet<NodeIndex<u32>> = self
            .graph
            .node_indices()
            .filter(|&ix| self.graph[ix].state() == NodeState::Stale)
            .collect();
        if stale.is_empty() {
            return Ok(FlushPlan::default());
        }

        let subgraph = NodeFiltered::from_fn(&self.graph, |ix: NodeIndex<u32>| stale.contains(&ix));
        let order = toposort(&subgraph, None).map_err(|cycle| GraphError::GraphInconsistency {
            reason: format!(
                "stale subgraph has a cycle through '{}'",
                self.graph[cycle.node_id()].id()
            ),
        })?;

        let steps = order
            .into_iter()
            .map(|ix| {
                let mut after: SmallVec<[NodeId; 4]> = self
                    .graph
                    .edges_directed(ix, Direction::Incoming)
                    .map(|edge| edge.source())
                    .filter(|source| {
                        stale.contains(source) || self.graph[*source].state() == NodeState::Computing
                    })
                    .map(|source| self.graph[source].id().clone())
                    .collect();
                after.sort();
                after.dedup();
                PlanStep {
                    node: self.graph[ix].id().clone(),
                    after,
                }
            })
            .collect();

        Ok(FlushPlan { steps })
    }

    /// Admits a planned node for computing.
    pub fn begin_compute(&mut self, id: &NodeId) -> Admission<A, T> {
        let Some(&ix) = self.nodes.get(id) else {
            return Admission::Gone;
        };
        if self.graph[ix].state() != NodeState::Stale {
            return Admission::Gone;
        }
        let blocked = self
            .graph
            .edges_directed(ix, Direction::Incoming)
            .any(|edge| !self.graph[edge.source()].is_clean());
        if blocked {
            return Admission::Blocked;
        }

        let inputs = self.inputs_at(ix);
        let node = &mut self.graph[ix];
        node.mark_computing();
        Admission::Ready(ComputeJob {
            node: id.clone(),
            revision: node.revision(),
            descriptor: Arc::clone(node.descriptor()),
            inputs,
            target: node.render_target().cloned(),
        })
    }

    /// Stores a successful result for the job identified by `id`/`revision`.
    pub fn finish_compute(&mut self, id: &NodeId, revision: u64, output: A) -> Completion {
        match self.in_flight(id, revision) {
            Some(ix) => {
                self.graph[ix].store_output(Arc::new(output));
                Completion::Stored
            }
            None => Completion::Discarded,
        }
    }

    /// Records a failed compute for the job identified by `id`/`revision`.
    pub fn fail_compute(&mut self, id: &NodeId, revision: u64) -> Completion {
        match self.in_flight(id, revision) {
            Some(ix) => {
                self.graph[ix].mark_failed();
                Completion::Failed
            }
            None => Completion::Discarded,
        }
    }

    /// Puts a node whose compute will never report back into Stale again,
    /// together with its dependents. Returns `false` if the job was already
    /// written back or superseded.
    pub fn abandon_compute(&mut self, id: &NodeId, revision: u64) -> bool {
        match self.in_flight(id, revision) {
            Some(ix) => {
                self.invalidate(ix);
                true
            }
            None => false,
        }
    }

    fn in_flight(&self, id: &NodeId, revision: u64) -> Option<NodeIndex<u32>> {
        let ix = *self.nodes.get(id)?;
        let node = &self.graph[ix];
        (node.state() == NodeState::Computing && node.revision() == revision).then_some(ix)
    }
}
