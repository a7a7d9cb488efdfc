//! CLI error type.

use std::path::PathBuf;

use thiserror::Error;

use texgraph_core::{DocumentError, GraphError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("no document given (pass a path or set TEXGRAPH_DOCUMENT)")]
    NoDocument,

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } | CliError::NoDocument => 2,
            CliError::Io { .. } => 3,
            CliError::Document(_) | CliError::Graph(_) => 4,
        }
    }
}
