//! MCP session over Streamable HTTP: POST one JSON-RPC message, parse either
//! a plain JSON or SSE-framed response. Used per-call by
//! [`super::remote::RemoteMcpTool`] since a remote MCP tool keeps no session
//! between calls.

use std::sync::Mutex;

use mcp_core::{ErrorObject, MessageId, NotificationMessage, RequestMessage, ResultMessage};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::McpConnectionError;

const MCP_PROTOCOL_VERSION: &str = "2025-11-25";
const INITIALIZE_REQUEST_ID: &str = "weft-mcp-initialize";

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    id: Option<MessageId>,
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

fn parse_json_rpc_from_body(
    server: &str,
    body: &str,
    content_type: Option<&reqwest::header::HeaderValue>,
) -> Result<JsonRpcResponse, McpConnectionError> {
    let is_sse = content_type
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("text/event-stream"))
        .unwrap_or(false);

    if !is_sse {
        return serde_json::from_str(body)
            .map_err(|e| McpConnectionError::transport(server, format!("response json: {e}")));
    }

    let mut data_buffer = String::new();
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            if data == "[DONE]" || data.is_empty() {
                if let Some(r) = try_parse_complete(&data_buffer) {
                    return Ok(r);
                }
                data_buffer.clear();
                continue;
            }
            if data_buffer.is_empty() {
                data_buffer = data.to_string();
            } else {
                data_buffer.push('\n');
                data_buffer.push_str(data);
            }
            if let Some(r) = try_parse_complete(&data_buffer) {
                return Ok(r);
            }
        } else if line.trim().is_empty() {
            if let Some(r) = try_parse_complete(&data_buffer) {
                return Ok(r);
            }
            data_buffer.clear();
        }
    }
    if let Some(r) = try_parse_complete(&data_buffer) {
        return Ok(r);
    }
    Err(McpConnectionError::transport(
        server,
        "SSE stream: no JSON-RPC response (result/error) found",
    ))
}

fn try_parse_complete(buffer: &str) -> Option<JsonRpcResponse> {
    if buffer.is_empty() {
        return None;
    }
    let r: JsonRpcResponse = serde_json::from_str(buffer).ok()?;
    (r.result.is_some() || r.error.is_some()).then_some(r)
}

/// One-shot-or-repeatable MCP session over Streamable HTTP.
pub struct HttpSession {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
    session_id: Mutex<Option<String>>,
}

impl HttpSession {
    pub async fn connect(
        url: impl Into<String>,
        headers: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self, McpConnectionError> {
        let url = url.into();
        let headers: Vec<(String, String)> = headers.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| McpConnectionError::transport(&url, e.to_string()))?;
        let mut session = Self {
            client,
            url: url.clone(),
            headers,
            session_id: Mutex::new(None),
        };
        session.initialize().await?;
        Ok(session)
    }

    async fn initialize(&mut self) -> Result<(), McpConnectionError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "weft-mcp", "version": env!("CARGO_PKG_VERSION") }
        });
        let request = RequestMessage::new(INITIALIZE_REQUEST_ID, "initialize", params);
        let body = serde_json::to_vec(&request).map_err(|e| McpConnectionError::transport(&self.url, e.to_string()))?;

        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .body(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req.send().await.map_err(|e| McpConnectionError::transport(&self.url, e.to_string()))?;
        let status = resp.status();
        if let Some(id) = resp.headers().get("MCP-Session-Id").and_then(|v| v.to_str().ok()) {
            *self.session_id.lock().unwrap() = Some(id.to_string());
        }
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(McpConnectionError::transport(
                &self.url,
                format!("initialize HTTP {status}: {}", if text.is_empty() { "no body" } else { &text }),
            ));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp
            .text()
            .await
            .map_err(|e| McpConnectionError::transport(&self.url, format!("initialize response body: {e}")))?;
        let _: JsonRpcResponse = parse_json_rpc_from_body(&self.url, &text, content_type.as_ref())?;

        let notification = NotificationMessage::new("notifications/initialized", Some(json!({})));
        let notif_body =
            serde_json::to_vec(&notification).map_err(|e| McpConnectionError::transport(&self.url, e.to_string()))?;
        let mut req2 = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .body(notif_body);
        for (k, v) in &self.headers {
            req2 = req2.header(k.as_str(), v.as_str());
        }
        if let Some(id) = self.session_id.lock().unwrap().clone() {
            req2 = req2.header("MCP-Session-Id", id.as_str());
        }
        let resp2 = req2.send().await.map_err(|e| McpConnectionError::transport(&self.url, e.to_string()))?;
        let status2 = resp2.status();
        if status2 != reqwest::StatusCode::ACCEPTED && !status2.is_success() {
            let text = resp2.text().await.unwrap_or_default();
            return Err(McpConnectionError::transport(
                &self.url,
                format!(
                    "notifications/initialized HTTP {status2}: {}",
                    if text.is_empty() { "no body" } else { &text }
                ),
            ));
        }
        Ok(())
    }

    pub async fn request(&self, id: &str, method: &str, params: Value) -> Result<ResultMessage, McpConnectionError> {
        let request = RequestMessage::new(id, method, params);
        let body = serde_json::to_vec(&request).map_err(|e| McpConnectionError::transport(&self.url, e.to_string()))?;
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .body(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(sid) = self.session_id.lock().unwrap().clone() {
            req = req.header("MCP-Session-Id", sid.as_str());
        }
        let resp = req.send().await.map_err(|e| McpConnectionError::transport(&self.url, e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(McpConnectionError::transport(
                &self.url,
                format!("{method} HTTP {status}: {}", if text.is_empty() { "no body" } else { &text }),
            ));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp.text().await.map_err(|e| McpConnectionError::transport(&self.url, e.to_string()))?;
        let json = parse_json_rpc_from_body(&self.url, &text, content_type.as_ref())?;
        let msg_id = json.id.unwrap_or_else(|| MessageId::from(id));
        if let Some(err) = json.error {
            let err_obj = ErrorObject::new(err.code as i32, err.message, None);
            return Ok(ResultMessage::failure(msg_id, err_obj));
        }
        Ok(ResultMessage::success(msg_id, json.result.unwrap_or(Value::Null)))
    }
}
