//! A remote (Streamable HTTP) MCP tool: opens a fresh session per call
//! rather than holding one open, treating the server as stateless from the
//! caller's side — appropriate for servers that may be load-balanced across
//! instances.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::component::{Component, ComponentError};
use crate::data::NodeData;
use crate::schema::{PortSchema, PortType, StructuredType, ToolDescription};

use super::error::McpConnectionError;
use super::shared::{convert_tool_to_description, process_mcp_result};
use super::transport_http::HttpSession;

pub struct RemoteMcpTool {
    name: String,
    description: ToolDescription,
    server_url: String,
    headers: Vec<(String, String)>,
}

impl RemoteMcpTool {
    /// Opens one discovery session against `server_url`, lists its tools,
    /// and returns one [`RemoteMcpTool`] per discovered tool. The discovery
    /// session is dropped once listing completes; each tool opens its own
    /// session on every call.
    pub async fn discover(
        server_url: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> Result<Vec<Arc<dyn Component>>, McpConnectionError> {
        let server_url = server_url.into();
        let session = HttpSession::connect(server_url.clone(), headers.clone()).await?;
        let result = session
            .request("weft-tools-list", "tools/list", Value::Object(Default::default()))
            .await?;
        if let Some(err) = result.error {
            return Err(McpConnectionError::json_rpc(&server_url, err.message));
        }
        let tools_value = result
            .result
            .and_then(|r| r.get("tools").cloned())
            .and_then(|v| v.as_array().cloned())
            .ok_or_else(|| McpConnectionError::transport(&server_url, "no tools in response"))?;

        let mut tools: Vec<Arc<dyn Component>> = Vec::new();
        for t in tools_value {
            let name = t.get("name").and_then(Value::as_str);
            let description = t.get("description").and_then(Value::as_str);
            let input_schema = t.get("inputSchema").cloned().unwrap_or(Value::Object(Default::default()));
            if let Some(desc) = convert_tool_to_description(name, description, &input_schema) {
                tools.push(Arc::new(RemoteMcpTool {
                    name: desc.name.clone(),
                    description: desc,
                    server_url: server_url.clone(),
                    headers: headers.clone(),
                }));
            }
        }
        Ok(tools)
    }
}

#[async_trait]
impl Component for RemoteMcpTool {
    fn id(&self) -> &str {
        &self.name
    }

    fn get_inputs_schema(&self) -> StructuredType {
        StructuredType::new()
    }

    fn get_outputs_schema(&self) -> StructuredType {
        StructuredType::new()
            .with_port("output", PortSchema::required(PortType::String))
            .with_port("content", PortSchema::required(PortType::Json))
            .with_port("is_error", PortSchema::required(PortType::Bool))
    }

    fn tool_description(&self) -> Option<ToolDescription> {
        Some(self.description.clone())
    }

    async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
        let arguments = Value::Object(input.data.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

        let session = HttpSession::connect(self.server_url.clone(), self.headers.clone())
            .await
            .map_err(|e| ComponentError::execution(self.name.clone(), e.to_string()))?;
        let id = format!("weft-call-{}", self.name);
        let params = serde_json::json!({ "name": self.name, "arguments": arguments });
        let result = session
            .request(&id, "tools/call", params)
            .await
            .map_err(|e| ComponentError::execution(self.name.clone(), e.to_string()))?;
        if let Some(err) = result.error {
            return Err(ComponentError::execution(self.name.clone(), err.message));
        }
        let raw = result
            .result
            .ok_or_else(|| ComponentError::execution(self.name.clone(), "no result in tools/call response"))?;
        let (output, content, is_error) = process_mcp_result(&raw);

        let mut out = NodeData::new();
        out.insert("output", Value::String(output));
        out.insert("content", Value::Array(content));
        out.insert("is_error", Value::Bool(is_error));
        Ok(out)
    }
}
