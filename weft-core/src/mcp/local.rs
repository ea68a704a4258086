//! A local (stdio subprocess) MCP tool: one persistent session per server,
//! shared by every tool the server exposes, ensured lazily and torn down
//! explicitly via [`LocalMcpTool::close`]. Session setup is idempotent and
//! re-entrant, `close()` always clears the handle even when teardown itself
//! errors, and a timed-out call raises a connection error naming the elapsed
//! budget rather than hanging forever.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task;

use crate::component::{Component, ComponentError};
use crate::data::NodeData;
use crate::schema::{PortSchema, PortType, StructuredType, ToolDescription};

use super::error::McpConnectionError;
use super::shared::{convert_tool_to_description, process_mcp_result};
use super::transport_stdio::StdioSession;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The persistent stdio connection shared by all tools of one local MCP
/// server. Blocking session I/O runs via [`task::block_in_place`] so it
/// never leaves the calling worker thread: the transport is not `Send`
/// across an actual thread hop.
struct LocalMcpBackend {
    server_label: String,
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    stderr_verbose: bool,
    timeout: Duration,
    session: StdMutex<Option<StdioSession>>,
}

impl LocalMcpBackend {
    fn new(command: String, args: Vec<String>, env: Vec<(String, String)>, stderr_verbose: bool, timeout: Duration) -> Self {
        let server_label = format!("stdio://{command} {}", args.join(" "));
        Self {
            server_label,
            command,
            args,
            env,
            stderr_verbose,
            timeout,
            session: StdMutex::new(None),
        }
    }

    fn ensure_session_sync(&self) -> Result<(), McpConnectionError> {
        let mut guard = self.session.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let session = StdioSession::connect(
            self.command.clone(),
            self.args.clone(),
            Some(self.env.clone()),
            self.stderr_verbose,
        )
        .map_err(|e| McpConnectionError::transport(&self.server_label, e.to_string()))?;
        *guard = Some(session);
        Ok(())
    }

    async fn ensure_session(&self) -> Result<(), McpConnectionError> {
        task::block_in_place(|| self.ensure_session_sync())
    }

    /// Tears down the session if one exists. Always clears the handle even
    /// when the underlying transport errors, matching the original's
    /// "log a warning, never raise" close semantics.
    async fn close(&self) {
        task::block_in_place(|| {
            let mut guard = self.session.lock().unwrap();
            if guard.take().is_some() {
                tracing::debug!(server = %self.server_label, "closed local mcp session");
            }
        });
    }

    fn list_tools_sync(&self) -> Result<Vec<Value>, McpConnectionError> {
        let mut guard = self.session.lock().unwrap();
        let session = guard
            .as_mut()
            .ok_or_else(|| McpConnectionError::transport(&self.server_label, "session not initialized"))?;
        let id = "weft-tools-list";
        session.send_request(id, "tools/list", Value::Object(Default::default()))?;
        let result = session
            .wait_for_result(id, self.timeout)?
            .ok_or_else(|| McpConnectionError::timeout(&self.server_label, self.timeout.as_secs()))?;
        if let Some(err) = result.error {
            return Err(McpConnectionError::json_rpc(&self.server_label, err.message));
        }
        let tools = result
            .result
            .and_then(|r| r.get("tools").cloned())
            .and_then(|v| v.as_array().cloned())
            .ok_or_else(|| McpConnectionError::transport(&self.server_label, "no tools in response"))?;
        Ok(tools)
    }

    async fn list_tools(&self) -> Result<Vec<Value>, McpConnectionError> {
        self.ensure_session().await?;
        task::block_in_place(|| self.list_tools_sync())
    }

    fn call_tool_sync(&self, name: &str, arguments: Value) -> Result<Value, McpConnectionError> {
        let mut guard = self.session.lock().unwrap();
        let session = guard
            .as_mut()
            .ok_or_else(|| McpConnectionError::transport(&self.server_label, "session not initialized"))?;
        let id = format!("weft-call-{name}");
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        session.send_request(&id, "tools/call", params)?;
        let result = session
            .wait_for_result(&id, self.timeout)?
            .ok_or_else(|| McpConnectionError::timeout(&self.server_label, self.timeout.as_secs()))?;
        if let Some(err) = result.error {
            return Err(McpConnectionError::json_rpc(&self.server_label, err.message));
        }
        result
            .result
            .ok_or_else(|| McpConnectionError::transport(&self.server_label, "no result in tools/call response"))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpConnectionError> {
        self.ensure_session().await?;
        task::block_in_place(|| self.call_tool_sync(name, arguments))
    }
}

/// One callable tool exposed by a local MCP server, sharing its server's
/// persistent [`LocalMcpBackend`] with every sibling tool discovered from the
/// same server.
pub struct LocalMcpTool {
    name: String,
    description: ToolDescription,
    backend: Arc<LocalMcpBackend>,
}

impl LocalMcpTool {
    /// Spawns `command`, completes the MCP handshake, lists its tools, and
    /// returns one [`LocalMcpTool`] per discovered tool — all sharing the
    /// same backend connection.
    pub async fn discover(
        command: impl Into<String>,
        args: Vec<String>,
        env: Vec<(String, String)>,
        stderr_verbose: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<Arc<dyn Component>>, McpConnectionError> {
        let backend = Arc::new(LocalMcpBackend::new(
            command.into(),
            args,
            env,
            stderr_verbose,
            timeout.unwrap_or(DEFAULT_TIMEOUT),
        ));
        let raw_tools = backend.list_tools().await?;

        let mut tools: Vec<Arc<dyn Component>> = Vec::new();
        for t in raw_tools {
            let name = t.get("name").and_then(Value::as_str);
            let description = t.get("description").and_then(Value::as_str);
            let input_schema = t.get("inputSchema").cloned().unwrap_or(Value::Object(Default::default()));
            if let Some(desc) = convert_tool_to_description(name, description, &input_schema) {
                tools.push(Arc::new(LocalMcpTool {
                    name: desc.name.clone(),
                    description: desc,
                    backend: backend.clone(),
                }));
            }
        }
        Ok(tools)
    }

    /// Tears down this tool's shared session. Safe to call once the run that
    /// discovered it has finished; later calls into sibling tools of the same
    /// server will re-open the connection on next use.
    pub async fn close(&self) {
        self.backend.close().await;
    }
}

#[async_trait]
impl Component for LocalMcpTool {
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
        let raw = self
            .backend
            .call_tool(&self.name, arguments)
            .await
            .map_err(|e| ComponentError::execution(self.name.clone(), e.to_string()))?;
        let (output, content, is_error) = process_mcp_result(&raw);

        let mut out = NodeData::new();
        out.insert("output", Value::String(output));
        out.insert("content", Value::Array(content));
        out.insert("is_error", Value::Bool(is_error));
        Ok(out)
    }
}
