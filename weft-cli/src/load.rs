//! Builds a [`weft_core::GraphDefinition`] from a JSON graph file: one entry
//! per node naming a built-in component type and its config, plus the edges
//! and mappings that wire them together.
//!
//! Only component types fully self-contained in `weft_core` are loadable
//! this way (`router`, `if_else`, and MCP tool discovery). Providers that
//! need an embedding application to supply a service — the agentic loop's
//! `CompletionService`, custom business-logic components — are wired by that
//! application calling `weft_core` directly; this loader is the CLI's
//! convenience path for graphs built entirely from the engine's own parts.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use weft_core::component::Component;
use weft_core::components::{IfElse, RouteCondition, Router};
use weft_core::mcp::{LocalMcpTool, RemoteMcpTool};
use weft_core::portmap::{RawMapping, Strategy as MappingStrategy};
use weft_core::GraphDefinition;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("reading graph file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("parsing graph file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("node '{0}': unknown component type '{1}'")]
    UnknownType(String, String),
    #[error("node '{id}': invalid config for type '{kind}': {reason}")]
    InvalidConfig { id: String, kind: String, reason: String },
    #[error("node '{id}': mcp discovery failed: {source}")]
    McpDiscovery {
        id: String,
        source: weft_core::mcp::McpConnectionError,
    },
    #[error("node '{id}': mcp server does not expose a tool named '{tool_name}'")]
    McpToolNotFound { id: String, tool_name: String },
    #[error("mapping strategy '{0}' is not recognized (expected direct, function_call, or bypass)")]
    UnknownMappingStrategy(String),
}

#[derive(Deserialize)]
struct GraphFile {
    nodes: Vec<NodeSpec>,
    edges: Vec<(String, String)>,
    start_nodes: Vec<String>,
    #[serde(default)]
    mappings: Vec<MappingSpec>,
}

#[derive(Deserialize)]
struct NodeSpec {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: Value,
}

#[derive(Deserialize)]
struct MappingSpec {
    source_id: String,
    source_port: String,
    target_id: String,
    target_port: String,
    #[serde(default = "default_mapping_strategy")]
    strategy: String,
}

fn default_mapping_strategy() -> String {
    "direct".to_string()
}

#[derive(Deserialize)]
struct RouterConfig {
    routes: Vec<RouteCondition>,
}

#[derive(Deserialize)]
struct McpLocalConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    stderr_verbose: bool,
    timeout_secs: Option<u64>,
    tool_name: String,
}

#[derive(Deserialize)]
struct McpRemoteConfig {
    server_url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    tool_name: String,
}

pub async fn load_graph_file(path: &Path) -> Result<GraphDefinition, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|e| LoadError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let file: GraphFile = serde_json::from_str(&raw)?;

    let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
    for node in &file.nodes {
        let component = build_component(node).await?;
        components.insert(node.id.clone(), component);
    }

    let mut mappings = Vec::with_capacity(file.mappings.len());
    for m in &file.mappings {
        let strategy = match m.strategy.as_str() {
            "direct" => MappingStrategy::Direct,
            "function_call" => MappingStrategy::FunctionCall,
            "bypass" => MappingStrategy::Bypass,
            other => return Err(LoadError::UnknownMappingStrategy(other.to_string())),
        };
        mappings.push(RawMapping {
            source_id: m.source_id.clone(),
            source_port: m.source_port.clone(),
            target_id: m.target_id.clone(),
            target_port: m.target_port.clone(),
            strategy,
        });
    }

    Ok(GraphDefinition {
        edges: file.edges,
        components,
        start_nodes: file.start_nodes,
        mappings,
    })
}

async fn build_component(node: &NodeSpec) -> Result<Arc<dyn Component>, LoadError> {
    match node.kind.as_str() {
        "router" => {
            let config: RouterConfig =
                serde_json::from_value(node.config.clone()).map_err(|e| LoadError::InvalidConfig {
                    id: node.id.clone(),
                    kind: node.kind.clone(),
                    reason: e.to_string(),
                })?;
            Ok(Arc::new(Router::new(node.id.clone(), config.routes)))
        }
        "if_else" => Ok(Arc::new(IfElse::new(node.id.clone()))),
        "mcp_local_tool" => {
            let config: McpLocalConfig =
                serde_json::from_value(node.config.clone()).map_err(|e| LoadError::InvalidConfig {
                    id: node.id.clone(),
                    kind: node.kind.clone(),
                    reason: e.to_string(),
                })?;
            let tools = LocalMcpTool::discover(
                config.command,
                config.args,
                config.env.into_iter().collect(),
                config.stderr_verbose,
                config.timeout_secs.map(Duration::from_secs),
            )
            .await
            .map_err(|e| LoadError::McpDiscovery { id: node.id.clone(), source: e })?;
            find_tool(tools, &node.id, &config.tool_name)
        }
        "mcp_remote_tool" => {
            let config: McpRemoteConfig =
                serde_json::from_value(node.config.clone()).map_err(|e| LoadError::InvalidConfig {
                    id: node.id.clone(),
                    kind: node.kind.clone(),
                    reason: e.to_string(),
                })?;
            let tools = RemoteMcpTool::discover(config.server_url, config.headers.into_iter().collect())
                .await
                .map_err(|e| LoadError::McpDiscovery { id: node.id.clone(), source: e })?;
            find_tool(tools, &node.id, &config.tool_name)
        }
        other => Err(LoadError::UnknownType(node.id.clone(), other.to_string())),
    }
}

fn find_tool(
    tools: Vec<Arc<dyn Component>>,
    node_id: &str,
    tool_name: &str,
) -> Result<Arc<dyn Component>, LoadError> {
    tools
        .into_iter()
        .find(|t| t.id() == tool_name)
        .ok_or_else(|| LoadError::McpToolNotFound {
            id: node_id.to_string(),
            tool_name: tool_name.to_string(),
        })
}
