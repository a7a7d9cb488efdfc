//! The engine: command interface over a [`NodeGraph`] plus the flush
//! executor that drives a [`RenderBackend`].
//!
//! The graph sits behind a `std::sync::Mutex` that is only ever held for the
//! duration of one synchronous graph call, never across an `.await`. Editing
//! calls are therefore plain `fn`s and can be made from any thread, including
//! while a flush is suspended inside the backend.
//!
//! A flush pass:
//! 1. takes the flush gate (`tokio::sync::Mutex<()>`) so at most one pass
//!    runs at a time;
//! 2. plans the Stale subgraph;
//! 3. admits ready nodes one at a time and runs their backend calls
//!    concurrently on a `FuturesUnordered`, releasing dependents as each
//!    call finishes and re-planning when a mutation wakes it;
//! 4. writes each result back under the lock, where the revision check drops
//!    results for nodes that were edited or deleted in the meantime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use texgraph_core::{
    Admission, Completion, ComputeJob, Connection, ConnectionId, DocumentError, EffectiveInputs, GraphDocument,
    GraphError, NodeGraph, NodeId, NodeSnapshot, NodeState, ParamValue, Params, SlotRef, TypeId, TypeProvider,
};

use crate::backend::{RenderBackend, RenderError, RenderRequest};
use crate::report::FlushReport;

type Graph<B> = NodeGraph<<B as RenderBackend>::Artifact, <B as RenderBackend>::Target>;

/// Dependency-graph evaluation engine.
pub struct Engine<B: RenderBackend> {
    graph: Mutex<Graph<B>>,
    types: Arc<dyn TypeProvider>,
    backend: B,
    /// Serializes flush passes.
    flush_gate: tokio::sync::Mutex<()>,
    /// Signalled by every mutation; consumed by the background scheduler.
    wake: Notify,
}

impl<B: RenderBackend> Engine<B> {
    pub fn new(backend: B, types: Arc<dyn TypeProvider>) -> Self {
        Engine {
            graph: Mutex::new(NodeGraph::new()),
            types,
            backend,
            flush_gate: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn types(&self) -> &Arc<dyn TypeProvider> {
        &self.types
    }

    fn graph(&self) -> MutexGuard<'_, Graph<B>> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_flush(&self) {
        self.wake.notify_one();
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Creates a node. It starts Stale and is picked up by the next flush.
    pub fn create_node(
        &self,
        id: impl Into<NodeId>,
        type_id: impl Into<TypeId>,
        params: Params,
    ) -> Result<(), GraphError> {
        let id = id.into();
        let type_id = type_id.into();
        self.graph()
            .create_node(self.types.as_ref(), id.clone(), &type_id, params)?;
        tracing::debug!(node = %id, type_id = %type_id, "node created");
        self.request_flush();
        Ok(())
    }

    /// Deletes a node with all its connections and returns the connections
    /// that were removed. The node's render target and output are released
    /// once no in-flight compute holds them.
    pub fn delete_node(&self, id: &NodeId) -> Result<Vec<Connection>, GraphError> {
        let removed = self.graph().delete_node(id)?;
        tracing::debug!(node = %id, connections = removed.connections.len(), "node deleted");
        self.request_flush();
        // Dropped here, outside the lock.
        Ok(removed.connections)
    }

    pub fn set_parameter(
        &self,
        id: &NodeId,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), GraphError> {
        self.graph().set_parameter(id, name, value.into())?;
        self.request_flush();
        Ok(())
    }

    pub fn create_connection(
        &self,
        id: impl Into<ConnectionId>,
        from: SlotRef,
        to: SlotRef,
    ) -> Result<(), GraphError> {
        let id = id.into();
        self.graph().create_connection(id.clone(), from, to)?;
        tracing::debug!(connection = %id, "connection created");
        self.request_flush();
        Ok(())
    }

    pub fn delete_connection(&self, id: &ConnectionId) -> Result<Connection, GraphError> {
        let conn = self.graph().delete_connection(id)?;
        self.request_flush();
        Ok(conn)
    }

    /// Attaches a render target to a node, or detaches it with `None`. The
    /// node is recomputed against the new target.
    pub fn set_render_target(&self, id: &NodeId, target: Option<B::Target>) -> Result<(), GraphError> {
        let previous = self.graph().set_render_target(id, target)?;
        drop(previous);
        self.request_flush();
        Ok(())
    }

    /// Requests recomputation of a node and its dependents. Returns `false`
    /// if the node was already waiting for a flush.
    pub fn schedule(&self, id: &NodeId) -> Result<bool, GraphError> {
        let invalidated = self.graph().schedule(id)?;
        self.request_flush();
        Ok(invalidated)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_node(&self, id: &NodeId) -> Option<NodeSnapshot> {
        self.graph().node(id).map(|node| node.snapshot())
    }

    /// The cached output of a node. Never a placeholder: `None` until the
    /// node has been computed successfully at least once.
    pub fn get_output(&self, id: &NodeId) -> Option<Arc<B::Artifact>> {
        self.graph().output(id)
    }

    pub fn node_state(&self, id: &NodeId) -> Option<NodeState> {
        self.graph().state(id)
    }

    pub fn render_target(&self, id: &NodeId) -> Option<Arc<B::Target>> {
        self.graph()
            .node(id)
            .and_then(|node| node.render_target().cloned())
    }

    pub fn effective_inputs(&self, id: &NodeId) -> Result<EffectiveInputs<B::Artifact>, GraphError> {
        self.graph().effective_inputs(id)
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<Connection> {
        self.graph().connection(id).cloned()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.graph().nodes().map(|node| node.id().clone()).collect();
        ids.sort();
        ids
    }

    pub fn nodes_in_state(&self, state: NodeState) -> Vec<NodeId> {
        self.graph().nodes_in_state(state)
    }

    /// Returns `true` if some node is Stale.
    pub fn needs_flush(&self) -> bool {
        self.graph().has_stale()
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub fn export_document(&self) -> GraphDocument {
        self.graph().to_document()
    }

    /// Loads a document into the current graph. All-or-nothing.
    pub fn load_document(&self, doc: &GraphDocument) -> Result<Vec<NodeId>, DocumentError> {
        let loaded = self.graph().load_document(doc, self.types.as_ref())?;
        tracing::info!(nodes = loaded.len(), connections = doc.connections.len(), "document loaded");
        self.request_flush();
        Ok(loaded)
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    /// Recomputes every Stale node, upstream before downstream.
    ///
    /// Independent nodes compute concurrently. A failed node keeps its
    /// previous output and blocks only its own dependents, which stay Stale.
    /// Mutations that arrive while calls are still in flight re-plan the
    /// pass: newly Stale nodes run as soon as their upstreams are Clean,
    /// without waiting for unrelated calls. Results for nodes edited while
    /// computing are discarded and the nodes stay Stale for the next pass.
    ///
    /// Dropping the returned future puts every node it was computing back
    /// into Stale.
    pub async fn flush(&self) -> Result<FlushReport, GraphError> {
        let _gate = self.flush_gate.lock().await;

        let plan = self.graph().flush_plan()?;
        let mut report = FlushReport::default();
        if plan.is_empty() {
            return Ok(report);
        }
        tracing::debug!(nodes = plan.len(), "flush planned");

        let mut tracker = plan.tracker();
        let mut admitted = Admitted::new(self);
        let mut running = FuturesUnordered::new();
        let mut replanned = false;

        loop {
            while let Some(id) = tracker.pop_ready() {
                let admission = self.graph().begin_compute(&id);
                match admission {
                    Admission::Ready(job) => {
                        admitted.insert(&job);
                        running.push(self.compute(job));
                    }
                    Admission::Blocked => {
                        tracing::debug!(node = %id, "upstream not clean, node left stale");
                        if !report.skipped.contains(&id) {
                            report.skipped.push(id.clone());
                        }
                        tracker.complete(&id);
                    }
                    Admission::Gone => {
                        tracing::debug!(node = %id, "node removed before compute");
                        tracker.complete(&id);
                    }
                }
            }
            if running.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = self.wake.notified() => {
                    replanned = true;
                    let plan = self.graph().flush_plan()?;
                    let added = tracker.extend(&plan);
                    if added > 0 {
                        tracing::debug!(nodes = added, "flush replanned");
                    }
                }
                Some((id, revision, result)) = running.next() => {
                    admitted.remove(&id);
                    match result {
                        Ok(artifact) => {
                            let completion = self.graph().finish_compute(&id, revision, artifact);
                            match completion {
                                Completion::Stored => report.computed.push(id.clone()),
                                _ => {
                                    tracing::warn!(node = %id, "node changed while computing, result discarded");
                                    report.discarded.push(id.clone());
                                }
                            }
                        }
                        Err(err) => {
                            let completion = self.graph().fail_compute(&id, revision);
                            match completion {
                                Completion::Failed => {
                                    tracing::warn!(node = %id, error = %err, "render failed");
                                    report.failed.push((id.clone(), err));
                                }
                                _ => report.discarded.push(id.clone()),
                            }
                        }
                    }
                    tracker.complete(&id);
                }
            }
        }

        // A wake consumed above may belong to work this pass left Stale.
        if replanned && self.needs_flush() {
            self.request_flush();
        }

        tracing::info!(
            computed = report.computed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            discarded = report.discarded.len(),
            "flush finished"
        );
        Ok(report)
    }

    fn compute(
        &self,
        job: ComputeJob<B::Artifact, B::Target>,
    ) -> impl Future<Output = (NodeId, u64, Result<B::Artifact, RenderError>)> + Send + '_ {
        let ComputeJob {
            node,
            revision,
            descriptor,
            inputs,
            target,
        } = job;
        let request = RenderRequest {
            node: node.clone(),
            descriptor,
            inputs,
            target,
        };
        async move {
            let result = self.backend.render(request).await;
            (node, revision, result)
        }
    }

    /// Spawns a task that flushes whenever a mutation requests it.
    ///
    /// Requests arriving while a pass is running coalesce into one follow-up
    /// pass. Each non-empty report is sent on the returned channel; the task
    /// keeps running if the receiver is dropped and stops when the handle is
    /// aborted.
    pub fn spawn_scheduler(self: &Arc<Self>) -> (JoinHandle<()>, mpsc::UnboundedReceiver<FlushReport>) {
        let engine = Arc::clone(self);
        let (tx, rx) = mpsc::unbounded_channel();
        if engine.needs_flush() {
            engine.request_flush();
        }

        let handle = tokio::spawn(async move {
            loop {
                engine.wake.notified().await;
                match engine.flush().await {
                    Ok(report) if report.is_empty() => {}
                    Ok(report) => {
                        let _ = tx.send(report);
                    }
                    Err(err) => tracing::error!(error = %err, "flush aborted"),
                }
            }
        });
        (handle, rx)
    }
}

/// Jobs a flush pass admitted and has not written back yet.
///
/// If the pass is dropped early (task aborted, caller timed out), the nodes
/// are put back into Stale on drop so that a later pass computes them.
struct Admitted<'a, B: RenderBackend> {
    engine: &'a Engine<B>,
    jobs: HashMap<NodeId, u64>,
}

impl<'a, B: RenderBackend> Admitted<'a, B> {
    fn new(engine: &'a Engine<B>) -> Self {
        Admitted {
            engine,
            jobs: HashMap::new(),
        }
    }

    fn insert(&mut self, job: &ComputeJob<B::Artifact, B::Target>) {
        self.jobs.insert(job.node.clone(), job.revision);
    }

    fn remove(&mut self, id: &NodeId) {
        self.jobs.remove(id);
    }
}

impl<B: RenderBackend> Drop for Admitted<'_, B> {
    fn drop(&mut self) {
        if self.jobs.is_empty() {
            return;
        }
        let mut graph = self.engine.graph();
        for (id, revision) in self.jobs.drain() {
            if graph.abandon_compute(&id, revision) {
                tracing::warn!(node = %id, "flush dropped while computing, node reset to stale");
            }
        }
    }
}
