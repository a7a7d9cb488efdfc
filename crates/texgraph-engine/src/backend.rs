//! Rendering backend boundary.
//!
//! The engine never interprets a type's program. It hands the backend the
//! node's [`TypeDescriptor`], its effective inputs and its render target, and
//! caches whatever artifact comes back.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use texgraph_core::{EffectiveInputs, NodeId, TypeDescriptor};

/// Failure reported by a backend for one node.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderError {
    #[error("backend has no program named '{program}'")]
    UnsupportedProgram { program: String },

    #[error("required input '{slot}' has no value")]
    MissingInput { slot: String },

    #[error("invalid value for '{slot}': {reason}")]
    InvalidParameter { slot: String, reason: String },

    #[error("render failed: {0}")]
    Failed(String),
}

/// A single backend invocation. Owns shared handles only, so it can be
/// moved into the compute future without borrowing the graph.
#[derive(Debug)]
pub struct RenderRequest<A, T> {
    pub node: NodeId,
    pub descriptor: Arc<TypeDescriptor>,
    pub inputs: EffectiveInputs<A>,
    pub target: Option<Arc<T>>,
}

impl<A, T> RenderRequest<A, T> {
    /// The program named by the node's type.
    pub fn program(&self) -> &str {
        &self.descriptor.compute.program
    }
}

/// Executes node programs.
///
/// Calls for independent nodes may run concurrently, so implementations must
/// not assume any ordering beyond "upstream before downstream".
pub trait RenderBackend: Send + Sync + 'static {
    /// The cached output of a node.
    type Artifact: Send + Sync + 'static;
    /// Handle to where a node displays its output; `()` when unused.
    type Target: Send + Sync + 'static;

    fn render(
        &self,
        request: RenderRequest<Self::Artifact, Self::Target>,
    ) -> impl Future<Output = Result<Self::Artifact, RenderError>> + Send;
}
