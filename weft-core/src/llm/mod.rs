//! The `CompletionService` abstraction: the core never speaks a concrete
//! provider wire format, only this trait, covering `function_call`,
//! `structured_completion`, `embed`, `vision`, `ocr`, and `web_search`.

use async_trait::async_trait;
use serde_json::Value;

use crate::data::ChatMessage;
use crate::schema::ToolDescription;

/// Whether the model must, may, or must not emit tool calls on this request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
}

/// The assistant turn returned by [`CompletionService::function_call`]:
/// either free text, or one or more tool-call requests (never both empty).
#[derive(Clone, Debug, Default)]
pub struct FunctionCallResponse {
    pub content: String,
    pub tool_calls: Vec<crate::data::ToolCall>,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("completion provider error: {0}")]
    Provider(String),
}

/// Provider-agnostic completion surface the core depends on. A concrete
/// implementation wraps a specific vendor SDK; none ships in this crate.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Model identifier surfaced on trace spans, recorded under
    /// `SpanAttributes.LLM_MODEL_NAME` on every agentic-loop span.
    fn model_name(&self) -> &str;

    async fn function_call(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescription],
        tool_choice: ToolChoice,
    ) -> Result<FunctionCallResponse, LlmError>;

    async fn completion(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    async fn structured_completion(&self, messages: &[ChatMessage], schema: &Value) -> Result<Value, LlmError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    async fn vision(&self, images: &[Vec<u8>], prompt: &str, schema: Option<&Value>) -> Result<Value, LlmError>;

    async fn ocr(&self, image: &[u8]) -> Result<String, LlmError>;

    async fn web_search(&self, query: &str, allowed_domains: Option<&[String]>) -> Result<Vec<Value>, LlmError>;
}

/// A scripted [`CompletionService`] for tests: returns the next response from
/// a fixed queue on each `function_call`, panicking if the queue is
/// exhausted.
pub struct MockCompletionService {
    responses: std::sync::Mutex<Vec<FunctionCallResponse>>,
    model_name: String,
}

impl MockCompletionService {
    pub fn new(responses: Vec<FunctionCallResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            model_name: "mock-model".to_string(),
        }
    }

    /// A mock that calls `tool_name(args)` once, then returns `final_text`.
    pub fn first_tool_then_end(
        tool_name: impl Into<String>,
        args: Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            FunctionCallResponse {
                content: String::new(),
                tool_calls: vec![crate::data::ToolCall {
                    id: "call_0".to_string(),
                    name: tool_name.into(),
                    arguments: args,
                }],
            },
            FunctionCallResponse {
                content: final_text.into(),
                tool_calls: vec![],
            },
        ])
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn function_call(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDescription],
        _tool_choice: ToolChoice,
    ) -> Result<FunctionCallResponse, LlmError> {
        let mut queue = self.responses.lock().unwrap();
        if queue.is_empty() {
            return Err(LlmError::Provider("MockCompletionService: response queue exhausted".into()));
        }
        Ok(queue.remove(0))
    }

    async fn completion(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        Ok(messages.last().map(ChatMessage::to_string_lossy).unwrap_or_default())
    }

    async fn structured_completion(&self, _messages: &[ChatMessage], _schema: &Value) -> Result<Value, LlmError> {
        Ok(Value::Object(serde_json::Map::new()))
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(vec![0.0])
    }

    async fn vision(&self, _images: &[Vec<u8>], _prompt: &str, _schema: Option<&Value>) -> Result<Value, LlmError> {
        Ok(Value::Null)
    }

    async fn ocr(&self, _image: &[u8]) -> Result<String, LlmError> {
        Ok(String::new())
    }

    async fn web_search(&self, _query: &str, _allowed_domains: Option<&[String]>) -> Result<Vec<Value>, LlmError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_emits_one_tool_call_then_final_text() {
        let mock = MockCompletionService::first_tool_then_end("echo", serde_json::json!({"text": "hi"}), "done");
        let first = mock.function_call(&[], &[], ToolChoice::Auto).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        assert_eq!(first.tool_calls[0].name, "echo");

        let second = mock.function_call(&[], &[], ToolChoice::Auto).await.unwrap();
        assert!(second.tool_calls.is_empty());
        assert_eq!(second.content, "done");
    }

    #[tokio::test]
    async fn mock_panics_with_error_when_queue_exhausted() {
        let mock = MockCompletionService::new(vec![]);
        let err = mock.function_call(&[], &[], ToolChoice::Auto).await.unwrap_err();
        assert!(matches!(err, LlmError::Provider(_)));
    }
}
