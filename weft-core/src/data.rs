//! The universal packet flowing along every edge ([`NodeData`]) and the chat
//! message model ([`ChatMessage`]) components exchange with the LLM.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hidden field name carrying a component's routing instructions to the scheduler.
pub const DIRECTIVE_FIELD: &str = "_directive";

/// `(data, ctx)`: the packet that flows along every edge.
///
/// Only `data` is validated against port schemas. `ctx` (template variables,
/// user/session metadata, file attachments, graph-wide scratch space) is
/// propagated verbatim and merged across nested sub-graphs: when two `ctx`
/// maps are merged, the target's keys win over the source's.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeData {
    pub data: HashMap<String, Value>,
    pub ctx: HashMap<String, Value>,
}

impl NodeData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `NodeData` with a single data field, no ctx.
    pub fn with_field(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut data = HashMap::new();
        data.insert(key.into(), value.into());
        Self {
            data,
            ctx: HashMap::new(),
        }
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.data.get(port)
    }

    pub fn insert(&mut self, port: impl Into<String>, value: Value) {
        self.data.insert(port.into(), value);
    }

    /// Merges `other`'s `ctx` into `self`'s, with `self`'s existing keys taking
    /// precedence over `other`'s.
    pub fn merge_ctx_from(&mut self, other: &NodeData) {
        for (k, v) in &other.ctx {
            self.ctx.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    /// Reads the hidden `_directive` side-channel, if the producing component set one.
    pub fn directive(&self) -> Option<super::component::Directive> {
        self.data
            .get(DIRECTIVE_FIELD)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Stamps a directive onto this `NodeData`'s hidden field.
    pub fn with_directive(mut self, directive: super::component::Directive) -> Self {
        self.data.insert(
            DIRECTIVE_FIELD.to_string(),
            serde_json::to_value(directive).expect("Directive always serializes"),
        );
        self
    }
}

/// Role of a [`ChatMessage`] in a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One discriminated content part of a (possibly multi-modal) message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: String },
    File { file: String, name: Option<String> },
}

impl ContentPart {
    fn as_display(&self) -> String {
        match self {
            ContentPart::Text { text } => text.clone(),
            ContentPart::ImageUrl { image_url } => format!("[image: {image_url}]"),
            ContentPart::File { file, name } => match name {
                Some(n) => format!("[file: {n} ({file})]"),
                None => format!("[file: {file}]"),
            },
        }
    }
}

/// Content of a [`ChatMessage`]: plain text, or a list of discriminated parts
/// (text/image/file) for multi-modal messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Lowers multi-part content to a single string for prompt templating.
    pub fn to_string_lossy(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(ContentPart::as_display)
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// A requested invocation of a tool, as emitted by the LLM's function-calling API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// `(role, content, tool_calls?, tool_call_id?)` — one turn of a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(String::new()),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Lowering used by prompt templating and by the coercion matrix's
    /// `messages -> string` conversion.
    pub fn to_string_lossy(&self) -> String {
        self.content.to_string_lossy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctx_merge_target_overrides_source() {
        let mut target = NodeData::new();
        target.ctx.insert("a".into(), Value::from("target"));
        let mut source = NodeData::new();
        source.ctx.insert("a".into(), Value::from("source"));
        source.ctx.insert("b".into(), Value::from("source-only"));

        target.merge_ctx_from(&source);

        assert_eq!(target.ctx.get("a"), Some(&Value::from("target")));
        assert_eq!(target.ctx.get("b"), Some(&Value::from("source-only")));
    }

    #[test]
    fn message_content_lowers_parts_to_string() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "hello ".into(),
            },
            ContentPart::ImageUrl {
                image_url: "http://x/y.png".into(),
            },
        ]);
        assert_eq!(content.to_string_lossy(), "hello [image: http://x/y.png]");
    }
}
