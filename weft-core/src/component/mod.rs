//! The polymorphic [`Component`] contract every graph node implements, plus
//! the hidden execution-directive side-channel routers and if/else nodes
//! use to steer the scheduler.

mod contract;

pub use contract::{ComponentContract, ComponentError, TraceSink};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::NodeData;
use crate::schema::{StructuredType, ToolDescription};

/// The port used when an edge is drawn without explicit port names.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CanonicalPorts {
    pub input: Option<String>,
    pub output: Option<String>,
}

/// How the scheduler should treat a component's output when deciding which
/// downstream nodes proceed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Normal,
    SelectivePorts,
    HaltAll,
}

/// The hidden `_directive` field a component's output may carry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Directive {
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_ports: Vec<String>,
}

impl Directive {
    pub fn normal() -> Self {
        Self {
            strategy: Strategy::Normal,
            selected_ports: Vec::new(),
        }
    }

    pub fn selective_ports(ports: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            strategy: Strategy::SelectivePorts,
            selected_ports: ports.into_iter().map(Into::into).collect(),
        }
    }

    pub fn halt_all() -> Self {
        Self {
            strategy: Strategy::HaltAll,
            selected_ports: Vec::new(),
        }
    }
}

/// Every node in a graph implements `Component`: an id and an async run,
/// generalized from a single homogeneous state to typed, multi-port
/// [`NodeData`].
///
/// `migrated = true` means strict typed I/O; `false` opts into a legacy
/// message-passing compatibility mode — this crate implements only the
/// strict path; legacy shimming is an adapter concern left to callers.
#[async_trait]
pub trait Component: Send + Sync {
    /// Unique id of this node within its graph.
    fn id(&self) -> &str;

    fn get_inputs_schema(&self) -> StructuredType;

    fn get_outputs_schema(&self) -> StructuredType;

    fn get_canonical_ports(&self) -> CanonicalPorts {
        CanonicalPorts::default()
    }

    /// The tool description exposed when this component is used as a single
    /// LLM-callable tool (e.g. inside a ReAct agent's registry).
    fn tool_description(&self) -> Option<ToolDescription> {
        None
    }

    /// Multi-tool components (MCP sources) override this to expose more than
    /// one callable tool; default delegates to `tool_description`.
    async fn get_tool_descriptions(&self) -> Vec<ToolDescription> {
        self.tool_description().into_iter().collect()
    }

    /// `true` for strict typed I/O (the only path this crate implements).
    fn migrated(&self) -> bool {
        true
    }

    async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError>;
}
