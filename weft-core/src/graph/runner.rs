//! Kahn's-algorithm scheduler with concurrent ready-set dispatch, using
//! `tokio`/`futures` for concurrent awaits and
//! `tokio_util::sync::CancellationToken` for cooperative cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::coercion;
use crate::component::{Component, ComponentContract, ComponentError, Strategy as DirectiveStrategy, TraceSink};
use crate::data::NodeData;
use crate::error::EngineError;
use crate::portmap::{self, BuildError, RawMapping, ResolvedGraph, Strategy as MappingStrategy};

/// A DAG on opaque node ids, the components that implement them, the nodes
/// that receive the initial input directly, and the explicit port mappings.
pub struct GraphDefinition {
    pub edges: Vec<(String, String)>,
    pub components: HashMap<String, Arc<dyn Component>>,
    pub start_nodes: Vec<String>,
    pub mappings: Vec<RawMapping>,
}

/// What happened to one node during a run.
#[derive(Clone)]
pub enum Outcome {
    Completed(NodeData),
    /// No invocation, no output (every upstream this node depends on halted).
    Halted,
}

/// Keyed by terminal node id, the chosen resolution for multi-terminal
/// merging.
pub type TerminalOutputs = HashMap<String, NodeData>;

/// A built, runnable graph: the resolved port table plus the component
/// registry, ready for repeated `run` calls.
pub struct GraphRunner {
    components: HashMap<String, Arc<dyn Component>>,
    resolved: ResolvedGraph,
}

impl GraphRunner {
    /// Validates and resolves `definition`, returning a build-time error
    /// (cycle, missing coverage, unresolvable coercion, ...) or a runnable
    /// graph.
    pub fn build(definition: GraphDefinition) -> Result<Self, BuildError> {
        let resolved = portmap::resolve(
            &definition.edges,
            &definition.components,
            &definition.start_nodes,
            &definition.mappings,
        )?;
        Ok(Self {
            components: definition.components,
            resolved,
        })
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    /// Runs the graph against `input`, with no cancellation token (a fresh,
    /// never-tripped one is created internally).
    pub async fn run(&self, input: NodeData) -> Result<TerminalOutputs, EngineError> {
        self.run_cancellable(input, CancellationToken::new()).await
    }

    /// Runs the graph, cancelling every in-flight node and MCP session the
    /// moment `cancel` trips.
    pub async fn run_cancellable(
        &self,
        input: NodeData,
        cancel: CancellationToken,
    ) -> Result<TerminalOutputs, EngineError> {
        let mut outcomes: HashMap<String, Outcome> = HashMap::new();
        let mut dispatched_inputs: HashMap<String, NodeData> = HashMap::new();

        let mut remaining_preds: HashMap<String, usize> = self
            .resolved
            .predecessors
            .iter()
            .map(|(id, preds)| (id.clone(), preds.len()))
            .collect();

        let mut ready: Vec<String> = remaining_preds
            .iter()
            .filter(|(_, &n)| n == 0)
            .map(|(id, _)| id.clone())
            .collect();
        ready.sort();

        while !ready.is_empty() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let mut join_set: JoinSet<(String, Result<NodeData, ComponentError>)> = JoinSet::new();
            let mut finished_this_round = Vec::new();

            for node_id in ready.drain(..) {
                match self.resolve_node_input(&node_id, &input, &outcomes, &dispatched_inputs)? {
                    None => {
                        outcomes.insert(node_id.clone(), Outcome::Halted);
                        finished_this_round.push(node_id);
                    }
                    Some(node_input) => {
                        dispatched_inputs.insert(node_id.clone(), node_input.clone());
                        let component = Arc::clone(&self.components[&node_id]);
                        let cancel_child = cancel.clone();
                        let id_for_task = node_id.clone();
                        join_set.spawn(async move {
                            let trace = TraceSink::default();
                            let contract = ComponentContract::new(component.as_ref());
                            let result = tokio::select! {
                                biased;
                                _ = cancel_child.cancelled() => {
                                    Err(ComponentError::execution(id_for_task.clone(), "run cancelled"))
                                }
                                r = contract.run(node_input, &trace) => r,
                            };
                            (id_for_task, result)
                        });
                    }
                }
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((node_id, Ok(output))) => {
                        outcomes.insert(node_id.clone(), Outcome::Completed(output));
                        finished_this_round.push(node_id);
                    }
                    Ok((node_id, Err(e))) => {
                        cancel.cancel();
                        tracing::error!(node_id = %node_id, error = %e, "graph run aborted");
                        return Err(EngineError::Component(e));
                    }
                    Err(join_err) => {
                        cancel.cancel();
                        return Err(EngineError::Component(ComponentError::execution(
                            "<unknown>",
                            format!("task join failed: {join_err}"),
                        )));
                    }
                }
            }

            for node_id in &finished_this_round {
                for succ in &self.resolved.successors[node_id] {
                    let deg = remaining_preds.get_mut(succ).expect("successor registered");
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(succ.clone());
                    }
                }
            }
            ready.sort();
            ready.dedup();
        }

        Ok(self.collect_terminal_outputs(&outcomes))
    }

    /// Builds the `NodeData` a node should run with, or `None` if every
    /// upstream edge feeding it is inactive (the node itself halts,
    /// contributing no output — see `Directive::selective_ports`).
    fn resolve_node_input(
        &self,
        node_id: &str,
        initial_input: &NodeData,
        outcomes: &HashMap<String, Outcome>,
        dispatched_inputs: &HashMap<String, NodeData>,
    ) -> Result<Option<NodeData>, EngineError> {
        let preds = &self.resolved.predecessors[node_id];

        if preds.is_empty() {
            if self.resolved.start_nodes.iter().any(|s| s == node_id) {
                return Ok(Some(initial_input.clone()));
            }
            // A predecessor-less node not listed in S still runs once, with
            // an empty payload (its own construction-time inputs, if any,
            // are supplied via `disabled_as_input` ports).
            return Ok(Some(NodeData::new()));
        }

        let empty_table = HashMap::new();
        let port_table = self.resolved.port_table.get(node_id).unwrap_or(&empty_table);

        let mut result = NodeData::new();
        let mut any_active = false;

        for (target_port, mapping) in port_table {
            let source_outcome = match outcomes.get(&mapping.source_id) {
                Some(o) => o,
                None => continue,
            };
            let source_data = match source_outcome {
                Outcome::Halted => continue,
                Outcome::Completed(data) => data,
            };
            if !self.edge_is_active(source_data, &mapping.source_port) {
                continue;
            }

            any_active = true;
            result.merge_ctx_from(source_data);

            match mapping.strategy {
                MappingStrategy::Direct => {
                    if let Some(value) = source_data.data.get(&mapping.source_port) {
                        let source_ty = self.components[&mapping.source_id]
                            .get_outputs_schema()
                            .get(&mapping.source_port)
                            .map(|p| p.ty.clone());
                        let target_ty = self.components[node_id]
                            .get_inputs_schema()
                            .get(target_port)
                            .map(|p| p.ty.clone());
                        if let (Some(source_ty), Some(target_ty)) = (source_ty, target_ty) {
                            let coerced = coercion::coerce(&source_ty, &target_ty, value.clone())?;
                            result.data.insert(target_port.clone(), coerced);
                        } else {
                            result.data.insert(target_port.clone(), value.clone());
                        }
                    }
                }
                MappingStrategy::FunctionCall => {
                    if let Some(value) = source_data.data.get(&mapping.source_port) {
                        result.data.insert(target_port.clone(), value.clone());
                    }
                }
                MappingStrategy::Bypass => {
                    if let Some(upstream) = dispatched_inputs.get(&mapping.source_id) {
                        // `mapping.source_port` names a real field of the
                        // upstream payload when one exists (e.g. forwarding a
                        // single named input straight through). For a pure
                        // routing controller (Router, IfElse) the name is
                        // instead a virtual route label with no counterpart
                        // in the payload, so fall back to forwarding the
                        // controller's own sole input field, or its whole
                        // input object when it took more than one.
                        if let Some(value) = upstream.data.get(&mapping.source_port) {
                            result.data.insert(target_port.clone(), value.clone());
                        } else if upstream.data.len() == 1 {
                            let sole = upstream.data.values().next().expect("checked len == 1");
                            result.data.insert(target_port.clone(), sole.clone());
                        } else {
                            let whole = serde_json::to_value(&upstream.data).unwrap_or(Value::Null);
                            result.data.insert(target_port.clone(), whole);
                        }
                    }
                }
            }
        }

        if !any_active && !preds.is_empty() {
            return Ok(None);
        }
        Ok(Some(result))
    }

    fn edge_is_active(&self, source_output: &NodeData, source_port: &str) -> bool {
        match source_output.directive() {
            None => true,
            Some(directive) => match directive.strategy {
                DirectiveStrategy::Normal => true,
                DirectiveStrategy::HaltAll => false,
                DirectiveStrategy::SelectivePorts => {
                    directive.selected_ports.iter().any(|p| p == source_port)
                }
            },
        }
    }

    fn collect_terminal_outputs(&self, outcomes: &HashMap<String, Outcome>) -> TerminalOutputs {
        let mut terminals = TerminalOutputs::new();
        for node_id in self.components.keys() {
            let is_terminal = self
                .resolved
                .successors
                .get(node_id)
                .map(|s| s.is_empty())
                .unwrap_or(true);
            if !is_terminal {
                continue;
            }
            if let Some(Outcome::Completed(data)) = outcomes.get(node_id) {
                terminals.insert(node_id.clone(), data.clone());
            }
        }
        terminals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::CanonicalPorts;
    use crate::schema::{PortSchema, PortType, StructuredType};
    use async_trait::async_trait;

    struct Upper {
        id: String,
    }

    #[async_trait]
    impl Component for Upper {
        fn id(&self) -> &str {
            &self.id
        }
        fn get_inputs_schema(&self) -> StructuredType {
            StructuredType::new().with_port("in", PortSchema::required(PortType::String))
        }
        fn get_outputs_schema(&self) -> StructuredType {
            StructuredType::new().with_port("out", PortSchema::required(PortType::String))
        }
        fn get_canonical_ports(&self) -> CanonicalPorts {
            CanonicalPorts {
                input: Some("in".into()),
                output: Some("out".into()),
            }
        }
        async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
            let s = input.data.get("in").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(NodeData::with_field("out", s.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn linear_chain_propagates_through_two_nodes() {
        let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
        components.insert("a".into(), Arc::new(Upper { id: "a".into() }));
        components.insert("b".into(), Arc::new(Upper { id: "b".into() }));

        let def = GraphDefinition {
            edges: vec![("a".to_string(), "b".to_string())],
            components,
            start_nodes: vec!["a".to_string()],
            mappings: vec![],
        };
        let runner = GraphRunner::build(def).unwrap();
        let outputs = runner.run(NodeData::with_field("in", "hi")).await.unwrap();
        assert_eq!(outputs["b"].data.get("out").unwrap(), "HI");
        assert!(!outputs.contains_key("a"));
    }

    struct Router {
        id: String,
    }

    #[async_trait]
    impl Component for Router {
        fn id(&self) -> &str {
            &self.id
        }
        fn get_inputs_schema(&self) -> StructuredType {
            StructuredType::new().with_port("in", PortSchema::required(PortType::String))
        }
        fn get_outputs_schema(&self) -> StructuredType {
            StructuredType::new()
                .with_port("left", PortSchema::required(PortType::String))
                .with_port("right", PortSchema::required(PortType::String))
        }
        async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
            let s = input.data.get("in").cloned().unwrap_or_default();
            let mut out = NodeData::new();
            out.data.insert("left".into(), s.clone());
            out.data.insert("right".into(), s);
            Ok(out.with_directive(crate::component::Directive::selective_ports(["left"])))
        }
    }

    #[tokio::test]
    async fn halted_branch_contributes_no_terminal_output() {
        let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
        components.insert("r".into(), Arc::new(Router { id: "r".into() }));
        components.insert("left".into(), Arc::new(Upper { id: "left".into() }));
        components.insert("right".into(), Arc::new(Upper { id: "right".into() }));

        let def = GraphDefinition {
            edges: vec![
                ("r".to_string(), "left".to_string()),
                ("r".to_string(), "right".to_string()),
            ],
            components,
            start_nodes: vec!["r".to_string()],
            mappings: vec![
                RawMapping::direct("r", "left", "left", "in"),
                RawMapping::direct("r", "right", "right", "in"),
            ],
        };
        let runner = GraphRunner::build(def).unwrap();
        let outputs = runner.run(NodeData::with_field("in", "hi")).await.unwrap();
        assert_eq!(outputs["left"].data.get("out").unwrap(), "HI");
        assert!(!outputs.contains_key("right"));
    }
}
