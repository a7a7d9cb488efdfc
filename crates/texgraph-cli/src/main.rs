//! texgraph CLI.
//!
//! Provides the `texgraph` binary for working with texture graph documents.
//! `render` loads a document, evaluates every node with the CPU procedural
//! backend and prints one line per node with its state and a content digest
//! of its texture. `types` lists the built-in node types.

mod builtin;
mod config;
mod cpu;
mod error;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use texgraph_core::{GraphDocument, NodeId, NodeState, TypeDescriptor, TypeId};
use texgraph_engine::{Engine, FlushReport};

use crate::builtin::builtin_types;
use crate::config::Config;
use crate::cpu::CpuBackend;
use crate::error::CliError;

/// Texture graph evaluation tools.
#[derive(Parser)]
#[command(name = "texgraph", about = "Texture graph evaluation tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every node of a graph document.
    Render {
        /// Path to the graph document (default: $TEXGRAPH_DOCUMENT).
        document: Option<PathBuf>,

        /// Texture edge length in pixels (default: $TEXGRAPH_TEXTURE_SIZE or 64).
        #[arg(short, long)]
        size: Option<u32>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the built-in node types as JSON.
    Types,
}

/// Per-node result line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeSummary {
    id: NodeId,
    type_id: TypeId,
    state: NodeState,
    digest: Option<String>,
    mean: Option<f32>,
}

#[derive(Debug, Serialize)]
struct RenderOutput {
    nodes: Vec<NodeSummary>,
    report: FlushReport,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            document,
            size,
            json,
        } => run_render(document, size, json).await,
        Commands::Types => run_types(),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(err.exit_code());
        }
    }
}

/// Execute the render subcommand.
///
/// Returns exit code: 0 = every node rendered, 1 = some node failed or was
/// blocked by a failed upstream.
async fn run_render(document: Option<PathBuf>, size: Option<u32>, json: bool) -> Result<i32, CliError> {
    let config = Config::from_env()?.with_overrides(size, document)?;
    let output = render(&config).await?;

    if json {
        let text = serde_json::to_string_pretty(&output)
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
        println!("{}", text);
    } else {
        for node in &output.nodes {
            println!(
                "{:<20} {:<10} {:<9} {:<16} {}",
                node.id.as_str(),
                node.type_id.0,
                format!("{:?}", node.state).to_lowercase(),
                node.digest.as_deref().map(|d| &d[..16]).unwrap_or("-"),
                node.mean.map(|m| format!("{:.4}", m)).unwrap_or_else(|| "-".into()),
            );
        }
        for (node, err) in &output.report.failed {
            eprintln!("  {} failed: {}", node, err);
        }
    }

    Ok(if output.report.is_success() { 0 } else { 1 })
}

fn run_types() -> Result<i32, CliError> {
    let types = builtin_types()?;
    let descriptors = types.descriptors();
    let descriptors: Vec<&TypeDescriptor> = descriptors.iter().map(|d| d.as_ref()).collect();
    let text = serde_json::to_string_pretty(&descriptors)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize types: {}\"}}", e));
    println!("{}", text);
    Ok(0)
}

fn read_document(path: &Path) -> Result<GraphDocument, CliError> {
    let json = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(GraphDocument::from_json(&json)?)
}

async fn render(config: &Config) -> Result<RenderOutput, CliError> {
    let path = config.document.as_deref().ok_or(CliError::NoDocument)?;
    let document = read_document(path)?;

    let engine = Engine::new(CpuBackend::new(config.texture_size), Arc::new(builtin_types()?));
    engine.load_document(&document)?;
    tracing::info!(
        path = %path.display(),
        size = engine.backend().size(),
        "rendering document"
    );
    let report = engine.flush().await?;

    let nodes = engine
        .node_ids()
        .into_iter()
        .filter_map(|id| {
            let node = engine.get_node(&id)?;
            let texture = engine.get_output(&id);
            Some(NodeSummary {
                id,
                type_id: node.type_id,
                state: node.state,
                digest: texture.as_ref().map(|t| t.digest().to_hex().to_string()),
                mean: texture.as_ref().map(|t| t.mean()),
            })
        })
        .collect();

    Ok(RenderOutput { nodes, report })
}
