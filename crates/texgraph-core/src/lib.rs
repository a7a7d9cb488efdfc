pub mod types;
pub mod type_id;
pub mod id;
pub mod error;
pub mod node;
pub mod connection;
pub mod graph;
pub mod plan;
pub mod document;

// Re-export commonly used types
pub use types::{ComputeDef, OutputDef, ParamValue, Params, SlotDef, TypeDescriptor, ValueKind};
pub use type_id::{TypeId, TypeProvider, TypeRegistry};
pub use id::{ConnectionId, NodeId};
pub use error::GraphError;
pub use node::{EffectiveInputs, InputValue, Node, NodeSnapshot, NodeState};
pub use connection::{Connection, SlotRef};
pub use graph::{NodeGraph, RemovedNode};
pub use plan::{Admission, Completion, ComputeJob, FlushPlan, PlanStep, ReadyTracker};
pub use document::{ConnectionEntry, DocumentError, GraphDocument, NodeEntry, DOCUMENT_VERSION};
