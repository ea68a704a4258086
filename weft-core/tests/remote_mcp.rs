//! End-to-end coverage for remote MCP tool discovery and mediation: a
//! mocked Streamable HTTP server plays the MCP handshake (`initialize`,
//! `notifications/initialized`, `tools/list`, `tools/call`),
//! `RemoteMcpTool::discover` turns its one exposed tool into an ordinary
//! `Component`, and a graph wires that tool's output into a downstream node.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use weft_core::component::{CanonicalPorts, Component, ComponentError};
use weft_core::data::NodeData;
use weft_core::mcp::RemoteMcpTool;
use weft_core::portmap::RawMapping;
use weft_core::schema::{PortSchema, PortType, StructuredType};
use weft_core::{GraphDefinition, GraphRunner};

async fn start_mock_mcp_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("\"method\":\"initialize\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "weft-mcp-initialize",
            "result": {
                "protocolVersion": "2025-11-25",
                "capabilities": {},
                "serverInfo": {"name": "mock-mcp", "version": "0.1"},
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("\"method\":\"notifications/initialized\""))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("\"method\":\"tools/list\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "weft-tools-list",
            "result": {
                "tools": [{
                    "name": "echo_tool",
                    "description": "echoes the given text back with a prefix",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"text": {"type": "string"}},
                        "required": ["text"],
                    },
                }]
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("\"method\":\"tools/call\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "weft-call-echo_tool",
            "result": {
                "content": [{"type": "text", "text": "REMOTE:hi"}],
                "isError": false,
            }
        })))
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn discovers_and_calls_a_remote_tool() {
    let server = start_mock_mcp_server().await;

    let tools = RemoteMcpTool::discover(server.uri(), vec![]).await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].id(), "echo_tool");

    let output = tools[0].run(NodeData::with_field("text", "hi")).await.unwrap();
    assert_eq!(output.data.get("output").unwrap(), "REMOTE:hi");
    assert_eq!(output.data.get("is_error").unwrap(), false);
}

struct Upper {
    id: String,
}

#[async_trait]
impl Component for Upper {
    fn id(&self) -> &str {
        &self.id
    }
    fn get_inputs_schema(&self) -> StructuredType {
        StructuredType::new().with_port("in", PortSchema::required(PortType::String))
    }
    fn get_outputs_schema(&self) -> StructuredType {
        StructuredType::new().with_port("out", PortSchema::required(PortType::String))
    }
    fn get_canonical_ports(&self) -> CanonicalPorts {
        CanonicalPorts {
            input: Some("in".into()),
            output: Some("out".into()),
        }
    }
    async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
        let s = input.data.get("in").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(NodeData::with_field("out", s.to_uppercase()))
    }
}

#[tokio::test]
async fn remote_tool_output_mediates_into_a_downstream_node() {
    let server = start_mock_mcp_server().await;
    let tools = RemoteMcpTool::discover(server.uri(), vec![]).await.unwrap();
    let tool = tools.into_iter().next().unwrap();

    let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
    components.insert("tool".into(), tool);
    components.insert("upper".into(), Arc::new(Upper { id: "upper".into() }));

    let def = GraphDefinition {
        edges: vec![("tool".to_string(), "upper".to_string())],
        components,
        start_nodes: vec!["tool".to_string()],
        mappings: vec![RawMapping::direct("tool", "output", "upper", "in")],
    };
    let runner = GraphRunner::build(def).unwrap();
    let outputs = runner.run(NodeData::with_field("text", "hi")).await.unwrap();
    assert_eq!(outputs["upper"].data.get("out").unwrap(), "REMOTE:HI");
}
