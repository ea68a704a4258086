//! The MCP Tool Substrate: discovers tools from a Model Context Protocol
//! server and exposes each as an ordinary [`Component`](crate::component::Component),
//! so the Agentic Loop never needs to know whether a tool is local code, a
//! remote service, or an MCP-hosted one. Two transports, two lifetime
//! models: [`local::LocalMcpTool`] keeps one stdio session alive for the
//! whole run; [`remote::RemoteMcpTool`] opens a fresh HTTP session per call.

mod error;
mod local;
mod remote;
mod shared;
mod transport_http;
mod transport_stdio;

pub use error::McpConnectionError;
pub use local::LocalMcpTool;
pub use remote::RemoteMcpTool;
pub use shared::{convert_tool_to_description, merge_tool_arguments, process_mcp_result};
