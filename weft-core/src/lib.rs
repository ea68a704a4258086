//! # weft
//!
//! A typed, graph-based execution engine for composing AI-agent workflows:
//! nodes are opaque [`component::Component`] implementations wired together
//! through resolved port mappings, dispatched by a dependency-ordered
//! scheduler that understands execution directives (selective routing,
//! halting) as a first-class side channel rather than a special case.
//!
//! ## Main modules
//!
//! - [`schema`]: [`schema::PortType`], [`schema::StructuredType`],
//!   [`schema::ToolDescription`] — the typed-record surface every component
//!   exposes.
//! - [`data`]: [`data::NodeData`], [`data::ChatMessage`] — the packet that
//!   flows along every edge.
//! - [`coercion`]: the Type Coercion Matrix deciding whether a value may flow
//!   from one port type into another, and performing the conversion.
//! - [`component`]: the [`component::Component`] contract, execution
//!   directives, and [`component::ComponentContract`] (schema validation +
//!   tracing around a single node's run).
//! - [`components`]: concrete components shipped with the engine itself —
//!   [`components::Router`], [`components::IfElse`].
//! - [`portmap`]: the Port-Mapping Resolver — builds a [`portmap::ResolvedGraph`]
//!   from a graph's edges, components, and explicit mappings.
//! - [`graph`]: [`graph::GraphRunner`], [`graph::GraphRunnerBlock`] — the
//!   scheduler and sub-graph nesting.
//! - [`llm`]: [`llm::CompletionService`] — the provider-agnostic completion
//!   surface the core depends on.
//! - [`agent`]: [`agent::AgenticLoopComponent`] — the ReAct-style tool-calling
//!   loop, with prompt templating, history truncation, and shared sandbox
//!   lifecycle.
//! - [`mcp`]: [`mcp::LocalMcpTool`], [`mcp::RemoteMcpTool`] — exposes tools
//!   discovered from a Model Context Protocol server as ordinary components.
//! - [`error`]: [`error::EngineError`] — the error type aggregating every
//!   module's own focused error enum at the two points callers actually want
//!   one (a graph run, an agent run).

pub mod agent;
pub mod coercion;
pub mod component;
pub mod components;
pub mod data;
pub mod error;
pub mod graph;
pub mod llm;
pub mod mcp;
pub mod portmap;
pub mod schema;

pub use component::{CanonicalPorts, Component, ComponentContract, ComponentError, Directive, Strategy, TraceSink};
pub use data::{ChatMessage, NodeData};
pub use error::EngineError;
pub use graph::{GraphDefinition, GraphRunner, GraphRunnerBlock, Outcome, TerminalOutputs};
pub use llm::{CompletionService, FunctionCallResponse, LlmError, ToolChoice};
pub use portmap::{BuildError, RawMapping, ResolvedGraph};
pub use schema::{PortSchema, PortType, StructuredType, ToolDescription};
