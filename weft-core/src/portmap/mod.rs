//! The Port-Mapping Resolver: turns the user-supplied mapping list `M` into
//! a per-node resolved port table, validating the DAG property, mapping
//! coverage, and type compatibility at build time.
//!
//! Pure and synchronous: a fallible, non-async step that produces an
//! immutable compiled structure ([`ResolvedGraph`]).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::coercion::check as check_type_flows;
use crate::component::Component;
use crate::schema::PortType;

/// How a mapping's value reaches its target port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Coerce the source port's value through the [`crate::coercion`] matrix.
    Direct,
    /// The target receives the LLM-function-call-shaped arguments rather
    /// than a coerced port value (agentic loop tool wiring).
    FunctionCall,
    /// The target receives the *source node's own upstream input* for this
    /// port, not the source node's emitted output — how a branching node
    /// (Router, IfElse) forwards its predecessor's payload without
    /// re-emitting it.
    Bypass,
}

/// One user-supplied mapping record, before resolution.
#[derive(Clone, Debug)]
pub struct RawMapping {
    pub source_id: String,
    pub source_port: String,
    pub target_id: String,
    pub target_port: String,
    pub strategy: Strategy,
}

impl RawMapping {
    pub fn direct(
        source_id: impl Into<String>,
        source_port: impl Into<String>,
        target_id: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_port: source_port.into(),
            target_id: target_id.into(),
            target_port: target_port.into(),
            strategy: Strategy::Direct,
        }
    }

    pub fn bypass(
        source_id: impl Into<String>,
        source_port: impl Into<String>,
        target_id: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_port: source_port.into(),
            target_id: target_id.into(),
            target_port: target_port.into(),
            strategy: Strategy::Bypass,
        }
    }
}

/// A mapping after resolution: always attached to the target port it feeds.
#[derive(Clone, Debug)]
pub struct ResolvedMapping {
    pub source_id: String,
    pub source_port: String,
    pub strategy: Strategy,
}

/// Build-time errors, all surfaced synchronously at graph build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Graph contains cycles")]
    Cycle,

    #[error("no runnable registered for node '{0}'")]
    MissingRunnable(String),

    #[error("mapping references unknown node '{0}'")]
    UnknownNode(String),

    #[error("mapping references unknown port '{node}.{port}'")]
    UnknownPort { node: String, port: String },

    #[error("node '{0}' has multiple incoming connections and no explicit mapping")]
    MissingMappingCoverage(String),

    #[error("cannot synthesize a default mapping for node '{0}': no canonical or sole port available")]
    CannotSynthesize(String),

    #[error("Cannot coerce {source_id}.{source_port} ({source_type:?}) -> {target_id}.{target_port} ({target_type:?}): {reason}")]
    CannotCoerce {
        source_id: String,
        source_port: String,
        source_type: PortType,
        target_id: String,
        target_port: String,
        target_type: PortType,
        reason: String,
    },

    #[error("multiple start nodes declared but graph has no unambiguous entry: {0:?}")]
    DuplicateStartNodes(Vec<String>),
}

/// The resolved graph: topological order, predecessor/successor indices,
/// and the per-node target-port mapping table the Graph Runner consumes.
pub struct ResolvedGraph {
    pub order: Vec<String>,
    pub predecessors: HashMap<String, Vec<String>>,
    pub successors: HashMap<String, Vec<String>>,
    /// target_id -> target_port -> resolved source mapping.
    pub port_table: HashMap<String, HashMap<String, ResolvedMapping>>,
    pub start_nodes: Vec<String>,
}

impl ResolvedGraph {
    pub fn mappings_for(&self, target_id: &str) -> Option<&HashMap<String, ResolvedMapping>> {
        self.port_table.get(target_id)
    }
}

/// Resolves `edges` + `mappings` against `components` into a [`ResolvedGraph`].
pub fn resolve(
    edges: &[(String, String)],
    components: &HashMap<String, Arc<dyn Component>>,
    start_nodes: &[String],
    mappings: &[RawMapping],
) -> Result<ResolvedGraph, BuildError> {
    for (from, to) in edges {
        if !components.contains_key(from) {
            return Err(BuildError::MissingRunnable(from.clone()));
        }
        if !components.contains_key(to) {
            return Err(BuildError::MissingRunnable(to.clone()));
        }
    }
    let order = topological_order(edges, components)?;

    let mut predecessors: HashMap<String, Vec<String>> =
        components.keys().map(|id| (id.clone(), Vec::new())).collect();
    let mut successors: HashMap<String, Vec<String>> =
        components.keys().map(|id| (id.clone(), Vec::new())).collect();
    for (from, to) in edges {
        predecessors.get_mut(to).unwrap().push(from.clone());
        successors.get_mut(from).unwrap().push(to.clone());
    }

    for m in mappings {
        validate_mapping_endpoints(m, components)?;
    }

    let mut port_table: HashMap<String, HashMap<String, ResolvedMapping>> = HashMap::new();

    for (node_id, preds) in &predecessors {
        let component = &components[node_id];
        let mut resolved_for_node: HashMap<String, ResolvedMapping> = HashMap::new();

        if preds.len() >= 2 {
            let mut covered: HashSet<&str> = HashSet::new();
            for m in mappings.iter().filter(|m| &m.target_id == node_id) {
                covered.insert(m.source_id.as_str());
                if m.strategy == Strategy::Direct {
                    check_direct_mapping(m, components)?;
                }
                resolved_for_node.insert(
                    m.target_port.clone(),
                    ResolvedMapping {
                        source_id: m.source_id.clone(),
                        source_port: m.source_port.clone(),
                        strategy: m.strategy,
                    },
                );
            }
            for pred in preds {
                if !covered.contains(pred.as_str()) {
                    return Err(BuildError::MissingMappingCoverage(node_id.clone()));
                }
            }
        } else if preds.len() == 1 {
            let explicit: Vec<&RawMapping> =
                mappings.iter().filter(|m| &m.target_id == node_id).collect();
            if explicit.is_empty() {
                let pred = &preds[0];
                let pred_component = &components[pred];
                let synthesized = synthesize_canonical_mapping(pred, pred_component, node_id, component)?;
                check_direct_mapping(&synthesized, components)?;
                resolved_for_node.insert(
                    synthesized.target_port.clone(),
                    ResolvedMapping {
                        source_id: synthesized.source_id,
                        source_port: synthesized.source_port,
                        strategy: synthesized.strategy,
                    },
                );
            } else {
                for m in explicit {
                    if m.strategy == Strategy::Direct {
                        check_direct_mapping(m, components)?;
                    }
                    resolved_for_node.insert(
                        m.target_port.clone(),
                        ResolvedMapping {
                            source_id: m.source_id.clone(),
                            source_port: m.source_port.clone(),
                            strategy: m.strategy,
                        },
                    );
                }
            }
        } else {
            // No predecessors: a start node. Any explicit mappings (rare,
            // e.g. constant-valued sources) are still honored.
            for m in mappings.iter().filter(|m| &m.target_id == node_id) {
                resolved_for_node.insert(
                    m.target_port.clone(),
                    ResolvedMapping {
                        source_id: m.source_id.clone(),
                        source_port: m.source_port.clone(),
                        strategy: m.strategy,
                    },
                );
            }
        }

        port_table.insert(node_id.clone(), resolved_for_node);
    }

    Ok(ResolvedGraph {
        order,
        predecessors,
        successors,
        port_table,
        start_nodes: start_nodes.to_vec(),
    })
}

fn validate_mapping_endpoints(
    m: &RawMapping,
    components: &HashMap<String, Arc<dyn Component>>,
) -> Result<(), BuildError> {
    let source = components
        .get(&m.source_id)
        .ok_or_else(|| BuildError::UnknownNode(m.source_id.clone()))?;
    let target = components
        .get(&m.target_id)
        .ok_or_else(|| BuildError::UnknownNode(m.target_id.clone()))?;
    // A Bypass mapping substitutes the source node's own upstream input for
    // its output, so its source port must resolve against the source's
    // *input* schema, not its output schema — unless
    // the source declares no output ports at all (Router, IfElse): such a
    // node is a pure routing controller, and its Bypass mappings name a
    // virtual route identifier (e.g. `route_0`) rather than a real port, so
    // any name is accepted there.
    let source_port_schema_ok = if m.strategy == Strategy::Bypass {
        source.get_outputs_schema().is_empty() || source.get_inputs_schema().contains(&m.source_port)
    } else {
        source.get_outputs_schema().contains(&m.source_port)
    };
    if !source_port_schema_ok {
        return Err(BuildError::UnknownPort {
            node: m.source_id.clone(),
            port: m.source_port.clone(),
        });
    }
    if !target.get_inputs_schema().contains(&m.target_port) {
        return Err(BuildError::UnknownPort {
            node: m.target_id.clone(),
            port: m.target_port.clone(),
        });
    }
    Ok(())
}

fn check_direct_mapping(
    m: &RawMapping,
    components: &HashMap<String, Arc<dyn Component>>,
) -> Result<(), BuildError> {
    let source = &components[&m.source_id];
    let target = &components[&m.target_id];
    let source_ty = &source
        .get_outputs_schema()
        .get(&m.source_port)
        .ok_or_else(|| BuildError::UnknownPort {
            node: m.source_id.clone(),
            port: m.source_port.clone(),
        })?
        .ty
        .clone();
    let target_ty = &target
        .get_inputs_schema()
        .get(&m.target_port)
        .ok_or_else(|| BuildError::UnknownPort {
            node: m.target_id.clone(),
            port: m.target_port.clone(),
        })?
        .ty
        .clone();
    check_type_flows(source_ty, target_ty).map_err(|e| BuildError::CannotCoerce {
        source_id: m.source_id.clone(),
        source_port: m.source_port.clone(),
        source_type: source_ty.clone(),
        target_id: m.target_id.clone(),
        target_port: m.target_port.clone(),
        target_type: target_ty.clone(),
        reason: e.reason,
    })
}

fn synthesize_canonical_mapping(
    pred_id: &str,
    pred: &Arc<dyn Component>,
    node_id: &str,
    node: &Arc<dyn Component>,
) -> Result<RawMapping, BuildError> {
    let canonical_out = pred.get_canonical_ports().output;
    let canonical_in = node.get_canonical_ports().input;

    if let (Some(out_port), Some(in_port)) = (&canonical_out, &canonical_in) {
        if pred.get_outputs_schema().contains(out_port) && node.get_inputs_schema().contains(in_port) {
            return Ok(RawMapping::direct(pred_id, out_port.clone(), node_id, in_port.clone()));
        }
    }

    let sole_out = pred.get_outputs_schema().sole_port().map(str::to_string);
    let sole_in = node.get_inputs_schema().sole_port().map(str::to_string);
    if let (Some(out_port), Some(in_port)) = (sole_out, sole_in) {
        return Ok(RawMapping::direct(pred_id, out_port, node_id, in_port));
    }

    Err(BuildError::CannotSynthesize(node_id.to_string()))
}

/// Kahn's algorithm: also rejects self-loops (a node that is its own
/// predecessor can never reach indegree zero).
fn topological_order(
    edges: &[(String, String)],
    components: &HashMap<String, Arc<dyn Component>>,
) -> Result<Vec<String>, BuildError> {
    let mut indegree: HashMap<String, usize> = components.keys().map(|id| (id.clone(), 0)).collect();
    let mut adjacency: HashMap<String, Vec<String>> =
        components.keys().map(|id| (id.clone(), Vec::new())).collect();

    for (from, to) in edges {
        if from == to {
            return Err(BuildError::Cycle);
        }
        adjacency.get_mut(from).unwrap().push(to.clone());
        *indegree.get_mut(to).unwrap() += 1;
    }

    let mut initial: Vec<String> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| id.clone())
        .collect();
    initial.sort();
    let mut queue: VecDeque<String> = initial.into_iter().collect();

    let mut order = Vec::with_capacity(components.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.clone());
        for succ in &adjacency[&node] {
            let deg = indegree.get_mut(succ).unwrap();
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(succ.clone());
            }
        }
    }

    if order.len() != components.len() {
        return Err(BuildError::Cycle);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{CanonicalPorts, ComponentError};
    use crate::data::NodeData;
    use crate::schema::{PortSchema, PortType, StructuredType};
    use async_trait::async_trait;

    struct Stub {
        id: String,
        inputs: StructuredType,
        outputs: StructuredType,
        canonical: CanonicalPorts,
    }

    #[async_trait]
    impl Component for Stub {
        fn id(&self) -> &str {
            &self.id
        }
        fn get_inputs_schema(&self) -> StructuredType {
            self.inputs.clone()
        }
        fn get_outputs_schema(&self) -> StructuredType {
            self.outputs.clone()
        }
        fn get_canonical_ports(&self) -> CanonicalPorts {
            self.canonical.clone()
        }
        async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
            Ok(input)
        }
    }

    fn single_port_stub(id: &str) -> Arc<dyn Component> {
        Arc::new(Stub {
            id: id.to_string(),
            inputs: StructuredType::new().with_port("in", PortSchema::required(PortType::String)),
            outputs: StructuredType::new().with_port("out", PortSchema::required(PortType::String)),
            canonical: CanonicalPorts {
                input: Some("in".into()),
                output: Some("out".into()),
            },
        })
    }

    #[test]
    fn cycle_including_self_loop_is_rejected() {
        let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
        components.insert("a".into(), single_port_stub("a"));
        let edges = vec![("a".to_string(), "a".to_string())];
        let err = resolve(&edges, &components, &["a".to_string()], &[]).unwrap_err();
        assert!(matches!(err, BuildError::Cycle));
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
        components.insert("a".into(), single_port_stub("a"));
        components.insert("b".into(), single_port_stub("b"));
        let edges = vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
        ];
        let err = resolve(&edges, &components, &["a".to_string()], &[]).unwrap_err();
        assert!(matches!(err, BuildError::Cycle));
    }

    #[test]
    fn indegree_two_without_explicit_mapping_errors() {
        let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
        components.insert("a".into(), single_port_stub("a"));
        components.insert("b".into(), single_port_stub("b"));
        components.insert("c".into(), single_port_stub("c"));
        let edges = vec![
            ("a".to_string(), "c".to_string()),
            ("b".to_string(), "c".to_string()),
        ];
        let err = resolve(&edges, &components, &["a".to_string(), "b".to_string()], &[]).unwrap_err();
        assert!(matches!(err, BuildError::MissingMappingCoverage(id) if id == "c"));
    }

    #[test]
    fn indegree_one_synthesizes_canonical_mapping() {
        let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
        components.insert("a".into(), single_port_stub("a"));
        components.insert("b".into(), single_port_stub("b"));
        let edges = vec![("a".to_string(), "b".to_string())];
        let resolved = resolve(&edges, &components, &["a".to_string()], &[]).unwrap();
        let mapping = &resolved.port_table["b"]["in"];
        assert_eq!(mapping.source_id, "a");
        assert_eq!(mapping.source_port, "out");
    }

    #[test]
    fn indegree_two_with_full_coverage_succeeds() {
        let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
        components.insert("a".into(), single_port_stub("a"));
        components.insert("b".into(), single_port_stub("b"));
        components.insert(
            "d".into(),
            Arc::new(Stub {
                id: "d".into(),
                inputs: StructuredType::new()
                    .with_port("left", PortSchema::required(PortType::String))
                    .with_port("right", PortSchema::required(PortType::String)),
                outputs: StructuredType::new().with_port("out", PortSchema::required(PortType::String)),
                canonical: CanonicalPorts::default(),
            }),
        );
        let edges = vec![
            ("a".to_string(), "d".to_string()),
            ("b".to_string(), "d".to_string()),
        ];
        let mappings = vec![
            RawMapping::direct("a", "out", "d", "left"),
            RawMapping::direct("b", "out", "d", "right"),
        ];
        let resolved = resolve(&edges, &components, &["a".to_string(), "b".to_string()], &mappings).unwrap();
        assert_eq!(resolved.port_table["d"]["left"].source_id, "a");
        assert_eq!(resolved.port_table["d"]["right"].source_id, "b");
    }

    #[test]
    fn cannot_coerce_is_rejected_at_build_time() {
        let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
        components.insert(
            "a".into(),
            Arc::new(Stub {
                id: "a".into(),
                inputs: StructuredType::new(),
                outputs: StructuredType::new().with_port("out", PortSchema::required(PortType::Bool)),
                canonical: CanonicalPorts {
                    input: None,
                    output: Some("out".into()),
                },
            }),
        );
        components.insert(
            "b".into(),
            Arc::new(Stub {
                id: "b".into(),
                inputs: StructuredType::new().with_port("in", PortSchema::required(PortType::Messages)),
                outputs: StructuredType::new(),
                canonical: CanonicalPorts {
                    input: Some("in".into()),
                    output: None,
                },
            }),
        );
        let edges = vec![("a".to_string(), "b".to_string())];
        let err = resolve(&edges, &components, &["a".to_string()], &[]).unwrap_err();
        assert!(matches!(err, BuildError::CannotCoerce { .. }));
    }
}
