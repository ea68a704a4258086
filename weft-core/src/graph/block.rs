//! Sub-graph nesting ("opacity"): a whole [`GraphRunner`] behind a single
//! [`Component`] face, so a parent graph's scheduler never needs to know
//! whether a node is primitive or itself a graph.

use async_trait::async_trait;

use crate::component::{CanonicalPorts, Component, ComponentError};
use crate::data::NodeData;
use crate::schema::StructuredType;

use super::runner::GraphRunner;

/// Wraps an inner [`GraphRunner`] so it can sit as an ordinary node inside an
/// outer graph. The inner graph's own start nodes, terminals, and directives
/// are invisible from outside: only `inputs_schema`/`outputs_schema` and the
/// merged terminal output are observable.
pub struct GraphRunnerBlock {
    id: String,
    inner: GraphRunner,
    inputs_schema: StructuredType,
    outputs_schema: StructuredType,
    canonical: CanonicalPorts,
    /// If set, the block's output is exactly this terminal node's `NodeData`
    /// rather than a merge of every terminal (multi-terminal merge is
    /// otherwise a `HashMap` keyed by terminal node id).
    output_node: Option<String>,
}

impl GraphRunnerBlock {
    pub fn new(
        id: impl Into<String>,
        inner: GraphRunner,
        inputs_schema: StructuredType,
        outputs_schema: StructuredType,
    ) -> Self {
        Self {
            id: id.into(),
            inner,
            inputs_schema,
            outputs_schema,
            canonical: CanonicalPorts::default(),
            output_node: None,
        }
    }

    pub fn with_canonical_ports(mut self, canonical: CanonicalPorts) -> Self {
        self.canonical = canonical;
        self
    }

    pub fn with_output_node(mut self, node_id: impl Into<String>) -> Self {
        self.output_node = Some(node_id.into());
        self
    }
}

#[async_trait]
impl Component for GraphRunnerBlock {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_inputs_schema(&self) -> StructuredType {
        self.inputs_schema.clone()
    }

    fn get_outputs_schema(&self) -> StructuredType {
        self.outputs_schema.clone()
    }

    fn get_canonical_ports(&self) -> CanonicalPorts {
        self.canonical.clone()
    }

    async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
        let terminals = self
            .inner
            .run(input)
            .await
            .map_err(|e| ComponentError::execution(self.id.clone(), e.to_string()))?;

        if let Some(output_node) = &self.output_node {
            return terminals.get(output_node).cloned().ok_or_else(|| {
                ComponentError::execution(
                    self.id.clone(),
                    format!("sub-graph terminal node '{output_node}' produced no output"),
                )
            });
        }

        let mut node_ids: Vec<&String> = terminals.keys().collect();
        node_ids.sort();

        let mut merged = NodeData::new();
        for node_id in node_ids {
            let terminal = &terminals[node_id];
            merged.merge_ctx_from(terminal);
            for (k, v) in &terminal.data {
                merged.data.insert(k.clone(), v.clone());
            }
        }
        Ok(merged)
    }
}
