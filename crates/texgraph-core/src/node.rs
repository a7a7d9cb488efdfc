//! Nodes, their staleness state, and effective inputs.
//!
//! A [`Node`] is generic over the artifact type `A` produced by the rendering
//! backend and the render-target handle type `T` supplied by the embedder.
//! Both are held behind `Arc` so a compute call can borrow them across a
//! suspension point without the store lock, and so a finished artifact
//! replaces the cache in one pointer swap.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::type_id::TypeId;
use crate::types::{ParamValue, Params, TypeDescriptor};

/// Staleness state of a node's cached output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// The cache reflects the current effective inputs.
    Clean,
    /// The cache may not reflect the current effective inputs.
    Stale,
    /// A backend invocation is in flight.
    Computing,
    /// The last compute attempt failed. Any cache is from the last success.
    Failed,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node<A, T = ()> {
    id: NodeId,
    descriptor: Arc<TypeDescriptor>,
    params: Params,
    state: NodeState,
    /// Stamp of the most recent staleness mark; results computed against an
    /// older stamp are discarded.
    revision: u64,
    output: Option<Arc<A>>,
    target: Option<Arc<T>>,
}

impl<A, T> Node<A, T> {
    pub(crate) fn new(id: NodeId, descriptor: Arc<TypeDescriptor>, params: Params, revision: u64) -> Self {
        Node {
            id,
            descriptor,
            params,
            state: NodeState::Stale,
            revision,
            output: None,
            target: None,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn type_id(&self) -> &TypeId {
        &self.descriptor.id
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The cached output, if any. Never a placeholder.
    pub fn output(&self) -> Option<&Arc<A>> {
        self.output.as_ref()
    }

    pub fn render_target(&self) -> Option<&Arc<T>> {
        self.target.as_ref()
    }

    pub fn is_clean(&self) -> bool {
        self.state == NodeState::Clean
    }

    /// A read-only, lock-free copy of this node's editable state.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id.clone(),
            type_id: self.descriptor.id.clone(),
            params: self.params.clone(),
            state: self.state,
            has_output: self.output.is_some(),
            has_render_target: self.target.is_some(),
        }
    }

    pub(crate) fn set_param(&mut self, name: String, value: ParamValue) {
        self.params.insert(name, value);
    }

    pub(crate) fn set_target(&mut self, target: Option<Arc<T>>) -> Option<Arc<T>> {
        std::mem::replace(&mut self.target, target)
    }

    pub(crate) fn mark_stale(&mut self, revision: u64) {
        self.state = NodeState::Stale;
        self.revision = revision;
    }

    pub(crate) fn mark_computing(&mut self) {
        self.state = NodeState::Computing;
    }

    pub(crate) fn store_output(&mut self, output: Arc<A>) {
        self.output = Some(output);
        self.state = NodeState::Clean;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = NodeState::Failed;
    }
}

/// Cloned view of a node handed out by accessors that cannot return borrows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub type_id: TypeId,
    pub params: Params,
    pub state: NodeState,
    pub has_output: bool,
    pub has_render_target: bool,
}

/// The value feeding one input slot at compute time.
#[derive(Debug)]
pub enum InputValue<A> {
    /// Output of the bound upstream node.
    Artifact(Arc<A>),
    /// The node's own literal for this slot.
    Literal(ParamValue),
    /// Texture slot with no bound (or no ready) upstream.
    Unset,
}

impl<A> Clone for InputValue<A> {
    fn clone(&self) -> Self {
        match self {
            InputValue::Artifact(a) => InputValue::Artifact(Arc::clone(a)),
            InputValue::Literal(v) => InputValue::Literal(v.clone()),
            InputValue::Unset => InputValue::Unset,
        }
    }
}

/// Effective inputs of a node, one entry per declared input slot in
/// declaration order.
#[derive(Debug)]
pub struct EffectiveInputs<A> {
    values: IndexMap<String, InputValue<A>>,
}

impl<A> EffectiveInputs<A> {
    pub(crate) fn new(values: IndexMap<String, InputValue<A>>) -> Self {
        EffectiveInputs { values }
    }

    pub fn get(&self, slot: &str) -> Option<&InputValue<A>> {
        self.values.get(slot)
    }

    /// The upstream artifact bound to `slot`, if one is ready.
    pub fn artifact(&self, slot: &str) -> Option<&Arc<A>> {
        match self.values.get(slot) {
            Some(InputValue::Artifact(a)) => Some(a),
            _ => None,
        }
    }

    /// The literal for `slot`, if the slot is not fed by a connection.
    pub fn literal(&self, slot: &str) -> Option<&ParamValue> {
        match self.values.get(slot) {
            Some(InputValue::Literal(v)) => Some(v),
            _ => None,
        }
    }

    pub fn number(&self, slot: &str) -> Option<f64> {
        self.literal(slot).and_then(ParamValue::as_f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue<A>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<A> Clone for EffectiveInputs<A> {
    fn clone(&self) -> Self {
        EffectiveInputs {
            values: self.values.clone(),
        }
    }
}
