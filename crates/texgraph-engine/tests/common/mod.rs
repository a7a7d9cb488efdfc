//! Shared fixtures for engine integration tests.
//!
//! [`TraceBackend`] renders a node to a string describing its program and
//! effective inputs, e.g. `op(in=[src(seed=1)],gain=2)`, so tests can check
//! exactly which upstream values a computation saw.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use texgraph_core::{InputValue, NodeId, NodeState, ParamValue, Params, SlotDef, SlotRef, TypeDescriptor, TypeRegistry};
use texgraph_engine::{Engine, RenderBackend, RenderError, RenderRequest};

#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

#[derive(Default)]
pub struct TraceBackend {
    calls: Mutex<Vec<NodeId>>,
    fail_once: Mutex<HashSet<NodeId>>,
    gates: Mutex<HashMap<NodeId, Arc<Gate>>>,
}

impl TraceBackend {
    /// Node ids in the order their renders started.
    pub fn calls(&self) -> Vec<NodeId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, node: &str) -> usize {
        self.calls().iter().filter(|id| id.as_str() == node).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Makes the next render of `node` fail.
    pub fn fail_once(&self, node: &str) {
        self.fail_once.lock().unwrap().insert(NodeId::from(node));
    }

    /// Makes renders of `node` wait until [`TraceBackend::release`].
    pub fn hold(&self, node: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(NodeId::from(node), Arc::new(Gate::default()));
    }

    /// Waits until a held render of `node` has started.
    pub async fn entered(&self, node: &str) {
        let gate = self.gate(node).expect("node is not held");
        tokio::time::timeout(Duration::from_secs(5), gate.entered.notified())
            .await
            .expect("held render never started");
    }

    /// Lets one held render of `node` finish and stops holding it.
    pub fn release(&self, node: &str) {
        if let Some(gate) = self.gates.lock().unwrap().remove(&NodeId::from(node)) {
            gate.release.notify_one();
        }
    }

    fn gate(&self, node: &str) -> Option<Arc<Gate>> {
        self.gates.lock().unwrap().get(&NodeId::from(node)).cloned()
    }
}

fn describe(request: &RenderRequest<String, String>) -> String {
    let args: Vec<String> = request
        .inputs
        .iter()
        .filter(|(slot, _)| *slot != "fail")
        .map(|(slot, value)| match value {
            InputValue::Artifact(inner) => format!("{slot}=[{inner}]"),
            InputValue::Literal(ParamValue::Number(n)) => format!("{slot}={n}"),
            InputValue::Literal(other) => format!("{slot}={other:?}"),
            InputValue::Unset => format!("{slot}=_"),
        })
        .collect();
    let mut out = format!("{}({})", request.program(), args.join(","));
    if let Some(target) = &request.target {
        out.push('@');
        out.push_str(target);
    }
    out
}

impl RenderBackend for TraceBackend {
    type Artifact = String;
    type Target = String;

    fn render(
        &self,
        request: RenderRequest<String, String>,
    ) -> impl Future<Output = Result<String, RenderError>> + Send {
        async move {
            self.calls.lock().unwrap().push(request.node.clone());

            let gate = self.gates.lock().unwrap().get(&request.node).cloned();
            if let Some(gate) = gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }

            let forced = request
                .inputs
                .literal("fail")
                .and_then(ParamValue::as_bool)
                .unwrap_or(false);
            let once = self.fail_once.lock().unwrap().remove(&request.node);
            if forced || once {
                return Err(RenderError::Failed(format!("{} refused", request.node)));
            }
            Ok(describe(&request))
        }
    }
}

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register(
            TypeDescriptor::new("src", "Source", "src")
                .with_input(SlotDef::number("seed", 0.0))
                .with_input(SlotDef::boolean("fail", false)),
        )
        .unwrap();
    registry
        .register(
            TypeDescriptor::new("op", "Operator", "op")
                .with_input(SlotDef::texture("in"))
                .with_input(SlotDef::number("gain", 1.0))
                .with_input(SlotDef::boolean("fail", false)),
        )
        .unwrap();
    registry
        .register(
            TypeDescriptor::new("mix", "Mix", "mix")
                .with_input(SlotDef::texture("a"))
                .with_input(SlotDef::texture("b")),
        )
        .unwrap();
    registry
}

pub fn engine() -> Arc<Engine<TraceBackend>> {
    Arc::new(Engine::new(TraceBackend::default(), Arc::new(registry())))
}

pub fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

pub fn add(engine: &Engine<TraceBackend>, name: &str, ty: &str) {
    engine.create_node(name, ty, Params::new()).unwrap();
}

pub fn add_with(engine: &Engine<TraceBackend>, name: &str, ty: &str, params: &[(&str, ParamValue)]) {
    let params: Params = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    engine.create_node(name, ty, params).unwrap();
}

pub fn connect(engine: &Engine<TraceBackend>, conn: &str, from: &str, to: &str, slot: &str) {
    engine
        .create_connection(conn, SlotRef::new(from, "out"), SlotRef::new(to, slot))
        .unwrap();
}

pub fn output(engine: &Engine<TraceBackend>, node: &str) -> Option<String> {
    engine.get_output(&id(node)).map(|out| out.as_str().to_string())
}

pub fn state(engine: &Engine<TraceBackend>, node: &str) -> Option<NodeState> {
    engine.node_state(&id(node))
}

/// Polls until `node` reaches `wanted`, yielding to other tasks between
/// checks.
pub async fn wait_for_state(engine: &Engine<TraceBackend>, node: &str, wanted: NodeState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state(engine, node) != Some(wanted) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{node} never reached {wanted:?}"));
}
