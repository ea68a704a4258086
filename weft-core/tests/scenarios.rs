//! End-to-end coverage for the graph runner's own scheduling behavior,
//! exercised as whole graphs rather than through the scheduler's internal
//! unit tests: a diamond merge, a routed branch riding the real `Router`
//! component, and a ReAct tool-shortcut node wired into an ordinary graph.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use weft_core::component::{CanonicalPorts, Component, ComponentError};
use weft_core::components::{RouteCondition, RouteOperator, Router};
use weft_core::data::{ChatMessage, NodeData};
use weft_core::portmap::RawMapping;
use weft_core::schema::{PortSchema, PortType, StructuredType};
use weft_core::{GraphDefinition, GraphRunner};

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

struct Merge {
    id: String,
}

#[async_trait]
impl Component for Merge {
    fn id(&self) -> &str {
        &self.id
    }
    fn get_inputs_schema(&self) -> StructuredType {
        StructuredType::new()
            .with_port("left", PortSchema::required(PortType::String))
            .with_port("right", PortSchema::required(PortType::String))
    }
    fn get_outputs_schema(&self) -> StructuredType {
        StructuredType::new().with_port("out", PortSchema::required(PortType::String))
    }
    async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
        let left = input.data.get("left").and_then(|v| v.as_str()).unwrap_or_default();
        let right = input.data.get("right").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(NodeData::with_field("out", format!("{left}+{right}")))
    }
}

struct PrefixAdder {
    id: String,
    prefix: &'static str,
}

#[async_trait]
impl Component for PrefixAdder {
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
        Ok(NodeData::with_field("out", format!("{} {s}", self.prefix)))
    }
}

#[tokio::test]
async fn linear_chain_prefixes_accumulate_in_order() {
    let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
    components.insert("a".into(), Arc::new(PrefixAdder { id: "a".into(), prefix: "[A]" }));
    components.insert("b".into(), Arc::new(PrefixAdder { id: "b".into(), prefix: "[B]" }));
    components.insert("c".into(), Arc::new(PrefixAdder { id: "c".into(), prefix: "[C]" }));

    let def = GraphDefinition {
        edges: vec![("a".to_string(), "b".to_string()), ("b".to_string(), "c".to_string())],
        components,
        start_nodes: vec!["a".to_string()],
        mappings: vec![
            RawMapping::direct("a", "out", "b", "in"),
            RawMapping::direct("b", "out", "c", "in"),
        ],
    };

    let runner = GraphRunner::build(def).unwrap();
    let outputs = runner.run(NodeData::with_field("in", "Hello")).await.unwrap();
    assert_eq!(outputs["c"].data.get("out").unwrap(), "[C] [B] [A] Hello");
    assert!(!outputs.contains_key("a"));
    assert!(!outputs.contains_key("b"));
}

#[tokio::test]
async fn diamond_merge_combines_both_branches() {
    let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
    components.insert("start".into(), Arc::new(Upper { id: "start".into() }));
    components.insert("left".into(), Arc::new(Upper { id: "left".into() }));
    components.insert("right".into(), Arc::new(Upper { id: "right".into() }));
    components.insert("merge".into(), Arc::new(Merge { id: "merge".into() }));

    let def = GraphDefinition {
        edges: vec![
            ("start".to_string(), "left".to_string()),
            ("start".to_string(), "right".to_string()),
            ("left".to_string(), "merge".to_string()),
            ("right".to_string(), "merge".to_string()),
        ],
        components,
        start_nodes: vec!["start".to_string()],
        mappings: vec![
            RawMapping::direct("start", "out", "left", "in"),
            RawMapping::direct("start", "out", "right", "in"),
            RawMapping::direct("left", "out", "merge", "left"),
            RawMapping::direct("right", "out", "merge", "right"),
        ],
    };

    let runner = GraphRunner::build(def).unwrap();
    let outputs = runner.run(NodeData::with_field("in", "hi")).await.unwrap();
    assert_eq!(outputs["merge"].data.get("out").unwrap(), "HI+HI");
    assert!(!outputs.contains_key("left"));
    assert!(!outputs.contains_key("right"));
}

#[tokio::test]
async fn router_selects_one_branch_via_bypass_mapping() {
    let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
    let routes = vec![
        RouteCondition {
            value_a: serde_json::json!("matched"),
            operator: RouteOperator::Equals,
            value_b: Some(serde_json::json!("matched")),
        },
        RouteCondition {
            value_a: serde_json::json!("a"),
            operator: RouteOperator::Equals,
            value_b: Some(serde_json::json!("b")),
        },
    ];
    components.insert("router".into(), Arc::new(Router::new("router", routes)));
    components.insert("left".into(), Arc::new(Upper { id: "left".into() }));
    components.insert("right".into(), Arc::new(Upper { id: "right".into() }));

    let def = GraphDefinition {
        edges: vec![
            ("router".to_string(), "left".to_string()),
            ("router".to_string(), "right".to_string()),
        ],
        components,
        start_nodes: vec!["router".to_string()],
        mappings: vec![
            RawMapping::bypass("router", "route_0", "left", "in"),
            RawMapping::bypass("router", "route_1", "right", "in"),
        ],
    };

    let runner = GraphRunner::build(def).unwrap();
    let outputs = runner.run(NodeData::with_field("input", "hi")).await.unwrap();
    assert_eq!(outputs["left"].data.get("out").unwrap(), "HI");
    assert!(!outputs.contains_key("right"));
}

struct ShortcutTool {
    id: String,
}

#[async_trait]
impl Component for ShortcutTool {
    fn id(&self) -> &str {
        &self.id
    }
    fn get_inputs_schema(&self) -> StructuredType {
        StructuredType::new().with_port("query", PortSchema::optional(PortType::String))
    }
    fn get_outputs_schema(&self) -> StructuredType {
        StructuredType::new()
            .with_port("output", PortSchema::required(PortType::String))
            .with_port("is_final", PortSchema::required(PortType::Bool))
    }
    fn tool_description(&self) -> Option<weft_core::schema::ToolDescription> {
        Some(
            weft_core::schema::ToolDescription::new("lookup", "looks something up")
                .with_property("query", serde_json::json!({"type": "string"}), true),
        )
    }
    async fn run(&self, _input: NodeData) -> Result<NodeData, ComponentError> {
        let mut out = NodeData::new();
        out.insert("output", serde_json::Value::String("the answer is 42".to_string()));
        out.insert("is_final", serde_json::Value::Bool(true));
        Ok(out)
    }
}

#[tokio::test]
async fn shortcut_tool_ends_the_loop_without_a_second_completion_call() {
    use weft_core::agent::{AgenticLoopComponent, ReactOptions, ToolRegistry};
    use weft_core::llm::{FunctionCallResponse, MockCompletionService};

    let completion = Arc::new(MockCompletionService::new(vec![FunctionCallResponse {
        content: String::new(),
        tool_calls: vec![weft_core::data::ToolCall {
            id: "call_0".to_string(),
            name: "lookup".to_string(),
            arguments: serde_json::json!({"query": "meaning of life"}),
        }],
    }]));
    let registry = ToolRegistry::build(vec![Arc::new(ShortcutTool { id: "lookup".into() }) as Arc<dyn Component>]).await;
    let options = ReactOptions::default().with_allow_tool_shortcuts(true);
    let agent = AgenticLoopComponent::new("agent", completion, registry, options);

    let mut components: HashMap<String, Arc<dyn Component>> = HashMap::new();
    components.insert("agent".into(), Arc::new(agent));
    let def = GraphDefinition {
        edges: vec![],
        components,
        start_nodes: vec!["agent".to_string()],
        mappings: vec![],
    };
    let runner = GraphRunner::build(def).unwrap();

    let input = NodeData::with_field(
        "messages",
        serde_json::to_value(vec![ChatMessage::user("what is the meaning of life?")]).unwrap(),
    );
    let outputs = runner.run(input).await.unwrap();
    let agent_output = &outputs["agent"];
    assert_eq!(agent_output.data.get("output").unwrap(), "the answer is 42");
    assert_eq!(agent_output.data.get("is_final").unwrap(), true);
}
