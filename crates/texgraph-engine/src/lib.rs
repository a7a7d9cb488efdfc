//! Evaluation engine for texgraph dependency graphs.
//!
//! [`Engine`] owns a [`texgraph_core::NodeGraph`], accepts editing commands,
//! and recomputes Stale nodes through a [`RenderBackend`] either on demand
//! ([`Engine::flush`]) or from a background task ([`Engine::spawn_scheduler`]).

pub mod backend;
pub mod engine;
pub mod report;

pub use backend::{RenderBackend, RenderError, RenderRequest};
pub use engine::Engine;
pub use report::FlushReport;
