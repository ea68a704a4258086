//! Protocol-level event types: type + payload.
//! State-carrying variants use `serde_json::Value`; the graph runner serializes `NodeData` into that.

use serde::Serialize;
use serde_json::Value;

/// Protocol event: wire shape for one stream event (type + payload).
/// Envelope (session_id, node_id, event_id) is applied separately by `EnvelopeState`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    NodeEnter { id: String },
    NodeExit {
        id: String,
        result: Value,
    },
    NodeHalted { id: String },
    MessageChunk { content: String, id: String },
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    },
    Values { state: Value },
    Updates { id: String, state: Value },
    Custom { value: Value },
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
