//! The Agentic Loop / ReAct Node: a bounded tool-use loop presented to the
//! rest of the graph as one [`Component`](crate::component::Component),
//! generalized from a three-node ReAct state-graph chain into a single
//! recursive loop.

mod citations;
mod error;
mod history;
mod prompt;
mod react;
mod sandbox;

pub use citations::renumber_citations;
pub use error::AgentError;
pub use history::{HistoryMessageHandler, MINIMAL_FIRST_MESSAGES_RETAINED, MINIMAL_LAST_MESSAGES_RETAINED};
pub use prompt::{fill_prompt_template_with_priority, PromptTemplateError};
pub use react::{AgenticLoopComponent, ReactOptions, ToolRegistry};
pub use sandbox::{Sandbox, SharedSandbox, CODE_RUNNER_TOOLS};
