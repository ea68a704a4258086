use super::prompt::PromptTemplateError;
use crate::llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    PromptTemplate(#[from] PromptTemplateError),

    #[error("llm call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("tool '{0}' not found in registry")]
    ToolNotFound(String),

    #[error("tool '{tool}' call failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("sandbox error: {0}")]
    Sandbox(String),
}
