/// Errors from talking to an MCP server, whatever the transport. Always
/// carries the server address/command alongside the underlying message.
#[derive(Debug, thiserror::Error)]
pub enum McpConnectionError {
    #[error("mcp server '{server}': {message}")]
    Transport { server: String, message: String },

    #[error("mcp server '{server}': tool call timed out after {timeout_secs}s")]
    Timeout { server: String, timeout_secs: u64 },

    #[error("mcp server '{server}': rpc error: {message}")]
    JsonRpc { server: String, message: String },
}

impl McpConnectionError {
    pub fn transport(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn timeout(server: impl Into<String>, timeout_secs: u64) -> Self {
        Self::Timeout {
            server: server.into(),
            timeout_secs,
        }
    }

    pub fn json_rpc(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonRpc {
            server: server.into(),
            message: message.into(),
        }
    }
}
