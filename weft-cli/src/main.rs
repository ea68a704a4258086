//! `weft`: loads a JSON graph definition, builds the component registry it
//! references, runs it once against a JSON input packet, and prints the
//! resulting terminal outputs.
//!
//! Not a server: one process, one run, one exit code — the HTTP/TUI surface
//! a full agent platform would add on top is out of scope here.

mod load;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use weft_core::NodeData;

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Run a typed component graph once against a JSON input", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a graph definition file without running it.
    Check {
        /// Path to the graph definition JSON file.
        graph: PathBuf,
    },
    /// Build and run a graph once.
    Run {
        /// Path to the graph definition JSON file.
        graph: PathBuf,

        /// Inline JSON input, e.g. '{"data":{"text":"hi"},"ctx":{}}'. Mutually
        /// exclusive with --input-file.
        #[arg(short, long)]
        input: Option<String>,

        /// Path to a JSON file holding the input packet.
        #[arg(long)]
        input_file: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}

fn read_input(input: Option<String>, input_file: Option<PathBuf>) -> Result<NodeData, String> {
    let raw = match (input, input_file) {
        (Some(s), None) => s,
        (None, Some(path)) => {
            std::fs::read_to_string(&path).map_err(|e| format!("reading {}: {e}", path.display()))?
        }
        (None, None) => "{}".to_string(),
        (Some(_), Some(_)) => return Err("pass only one of --input / --input-file".to_string()),
    };
    serde_json::from_str(&raw).map_err(|e| format!("parsing input json: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { graph } => run_check(&graph).await,
        Commands::Run { graph, input, input_file } => run_once(&graph, input, input_file).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run_check(graph_path: &PathBuf) -> Result<(), String> {
    let definition = load::load_graph_file(graph_path)
        .await
        .map_err(|e| e.to_string())?;
    weft_core::GraphRunner::build(definition).map_err(|e| format!("graph is invalid: {e}"))?;
    println!("graph is valid");
    Ok(())
}

async fn run_once(
    graph_path: &PathBuf,
    input: Option<String>,
    input_file: Option<PathBuf>,
) -> Result<(), String> {
    let definition = load::load_graph_file(graph_path)
        .await
        .map_err(|e| e.to_string())?;
    let runner = weft_core::GraphRunner::build(definition).map_err(|e| format!("graph build failed: {e}"))?;

    let input = read_input(input, input_file)?;
    let terminals = runner.run(input).await.map_err(|e| format!("run failed: {e}"))?;

    let printable: std::collections::BTreeMap<_, _> = terminals.into_iter().collect();
    let json = serde_json::to_string_pretty(&printable).map_err(|e| format!("serializing output: {e}"))?;
    println!("{json}");
    Ok(())
}
