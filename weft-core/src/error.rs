//! Crate-level error aggregation.
//!
//! Each module keeps its own focused `thiserror` enum (`CoercionError`,
//! `BuildError`, `McpConnectionError`, `PromptTemplateError`,
//! `RoutingError`, `AgentError`) rather than one monolithic error type.
//! `EngineError` aggregates them with `#[from]` only at the two points
//! callers actually want one error type: a graph run and an agent run.

use crate::agent::AgentError;
use crate::coercion::CoercionError;
use crate::component::ComponentError;
use crate::portmap::BuildError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("graph build failed: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("execution cancelled")]
    Cancelled,
}
