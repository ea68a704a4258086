//! MCP session over stdio: spawns a server process, performs the initialize
//! handshake, and exposes blocking `send_request`/`wait_for_result` for
//! JSON-RPC calls.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use mcp_client::stdio::{
    JsonRpcMessage, StdioClientTransport, StdioServerParameters, StdioStream,
};
use mcp_core::{MessageId, NotificationMessage, RequestMessage, ResultMessage};
use serde_json::{json, Value};

use super::error::McpConnectionError;

const PROTOCOL_VERSION: &str = "2025-11-25";
const INITIALIZE_REQUEST_ID: &str = "weft-mcp-initialize";

pub struct StdioSession {
    server_label: String,
    transport: StdioClientTransport,
    receiver: mpsc::Receiver<JsonRpcMessage>,
}

impl StdioSession {
    pub fn connect(
        command: impl Into<String>,
        args: Vec<String>,
        env: Option<impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>>,
        stderr_verbose: bool,
    ) -> Result<Self, McpConnectionError> {
        let command = command.into();
        let server_label = format!("stdio://{command} {}", args.join(" "));
        let (tx, rx) = mpsc::channel();

        let stderr_stream = if stderr_verbose {
            StdioStream::Inherit
        } else {
            StdioStream::Null
        };
        let mut params = StdioServerParameters::new(command.clone())
            .args(args)
            .stderr(stderr_stream);
        if let Some(env_iter) = env {
            params = params.env(env_iter);
        }

        let mut transport = StdioClientTransport::new(params);
        transport.on_message(move |msg| {
            let _ = tx.send(msg);
        });
        let label_for_errors = server_label.clone();
        transport.on_error(move |e| {
            tracing::warn!(server = %label_for_errors, error = %e, "mcp stdio transport error");
        });

        transport
            .start()
            .map_err(|e| McpConnectionError::transport(&server_label, e.to_string()))?;

        let mut session = Self {
            server_label,
            transport,
            receiver: rx,
        };
        session.initialize()?;
        Ok(session)
    }

    fn initialize(&mut self) -> Result<(), McpConnectionError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "weft-mcp", "version": env!("CARGO_PKG_VERSION") }
        });
        self.send_request(INITIALIZE_REQUEST_ID, "initialize", params)?;

        match self.wait_for_result(INITIALIZE_REQUEST_ID, Duration::from_secs(20))? {
            Some(result) if result.error.is_some() => Err(McpConnectionError::json_rpc(
                &self.server_label,
                result.error.map(|e| e.message).unwrap_or_else(|| "unknown".into()),
            )),
            Some(_) => {
                let notification = JsonRpcMessage::Notification(NotificationMessage::new(
                    "notifications/initialized",
                    Some(json!({})),
                ));
                self.transport
                    .send(&notification)
                    .map_err(|e| McpConnectionError::transport(&self.server_label, e.to_string()))
            }
            None => Err(McpConnectionError::timeout(&self.server_label, 20)),
        }
    }

    pub fn send_request(&mut self, id: &str, method: &str, params: Value) -> Result<(), McpConnectionError> {
        let request = RequestMessage::new(id, method, params);
        self.transport
            .send(&JsonRpcMessage::Request(request))
            .map_err(|e| McpConnectionError::transport(&self.server_label, e.to_string()))
    }

    pub fn wait_for_result(
        &mut self,
        request_id: &str,
        timeout: Duration,
    ) -> Result<Option<ResultMessage>, McpConnectionError> {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now()).min(Duration::from_secs(1));

            match self.receiver.recv_timeout(remaining) {
                Ok(JsonRpcMessage::Result(msg)) if message_id_matches(&msg.id, request_id) => {
                    return Ok(Some(msg));
                }
                Ok(JsonRpcMessage::Request(req)) if req.method == "roots/list" => {
                    let result = ResultMessage::success(req.id.clone(), json!({ "roots": [] }));
                    self.transport
                        .send(&JsonRpcMessage::Result(result))
                        .map_err(|e| McpConnectionError::transport(&self.server_label, e.to_string()))?;
                }
                Ok(JsonRpcMessage::Request(_)) | Ok(JsonRpcMessage::Result(_)) => {}
                Ok(JsonRpcMessage::Notification(_)) => {}
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(None)
    }

    pub fn server_label(&self) -> &str {
        &self.server_label
    }
}

fn message_id_matches(id: &MessageId, expected: &str) -> bool {
    id.as_str() == Some(expected)
}
