//! The bounded agentic tool-use loop, generalized from a three-node
//! `think_node`/`act_node`/`observe_node` state-graph chain into a single
//! recursive [`Component`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use tracing::{warn, Instrument};

use crate::component::{CanonicalPorts, Component, ComponentContract, ComponentError};
use crate::data::{ChatMessage, NodeData, Role};
use crate::llm::{CompletionService, ToolChoice};
use crate::schema::{single_port_schema, PortSchema, PortType, StructuredType, ToolDescription};

use super::citations::renumber_citations;
use super::error::AgentError;
use super::history::HistoryMessageHandler;
use super::prompt::fill_prompt_template_with_priority;
use super::sandbox::{Sandbox, SharedSandbox, CODE_RUNNER_TOOLS};

/// Name of the synthetic tool the model calls to return a structured answer
/// when `output_format` is set, instead of free text.
const OUTPUT_TOOL_NAME: &str = "chat_formatting_output_tool";
const OUTPUT_TOOL_DESCRIPTION: &str =
    "Default tool to be used by the agent to answer in a structured format if no other tool is called";

/// Maps a JSON-schema-style `{"type": "..."}` fragment to the nearest
/// [`PortType`], falling back to `Json` for anything unrecognized.
fn port_type_from_json_schema(schema: &Value) -> PortType {
    match schema.get("type").and_then(Value::as_str) {
        Some("string") => PortType::String,
        Some("integer") => PortType::Int,
        Some("number") => PortType::Float,
        Some("boolean") => PortType::Bool,
        _ => PortType::Json,
    }
}

/// Options recognized by an agentic loop.
#[derive(Clone, Debug)]
pub struct ReactOptions {
    pub max_iterations: usize,
    pub max_tools_per_iteration: usize,
    pub run_tools_in_parallel: bool,
    pub allow_tool_shortcuts: bool,
    pub date_in_system_prompt: bool,
    pub first_history_messages: usize,
    pub last_history_messages: usize,
    pub input_data_field_for_messages_history: String,
    pub initial_prompt: Option<String>,
    pub fallback_react_answer: Option<String>,
    /// When set, the model is offered a `chat_formatting_output_tool` whose
    /// JSON-schema properties are these, and a call to it ends the loop with
    /// its arguments as the structured answer.
    pub output_format: Option<std::collections::BTreeMap<String, Value>>,
}

impl Default for ReactOptions {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_tools_per_iteration: 4,
            run_tools_in_parallel: true,
            allow_tool_shortcuts: false,
            date_in_system_prompt: false,
            first_history_messages: 1,
            last_history_messages: 50,
            input_data_field_for_messages_history: "messages".to_string(),
            initial_prompt: None,
            fallback_react_answer: None,
            output_format: None,
        }
    }
}

impl ReactOptions {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_max_tools_per_iteration(mut self, n: usize) -> Self {
        self.max_tools_per_iteration = n;
        self
    }

    pub fn with_run_tools_in_parallel(mut self, parallel: bool) -> Self {
        self.run_tools_in_parallel = parallel;
        self
    }

    pub fn with_allow_tool_shortcuts(mut self, allow: bool) -> Self {
        self.allow_tool_shortcuts = allow;
        self
    }

    pub fn with_initial_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.initial_prompt = Some(prompt.into());
        self
    }

    pub fn with_fallback_react_answer(mut self, answer: impl Into<String>) -> Self {
        self.fallback_react_answer = Some(answer.into());
        self
    }

    pub fn with_output_format(mut self, properties: std::collections::BTreeMap<String, Value>) -> Self {
        self.output_format = Some(properties);
        self
    }
}

/// The registry of tools an agentic loop may call, built from a set of
/// tool-providing [`Component`]s. Duplicate tool names across sources
/// overwrite the earlier binding with a warning.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Component>>,
    descriptions: Vec<ToolDescription>,
}

impl ToolRegistry {
    pub async fn build(sources: Vec<Arc<dyn Component>>) -> Self {
        let mut tools: HashMap<String, Arc<dyn Component>> = HashMap::new();
        let mut descriptions: Vec<ToolDescription> = Vec::new();

        for source in sources {
            for desc in source.get_tool_descriptions().await {
                if tools.contains_key(&desc.name) {
                    warn!(tool = %desc.name, "duplicate tool name in registry, overwriting previous binding");
                }
                tools.insert(desc.name.clone(), source.clone());
                match descriptions.iter_mut().find(|d: &&mut ToolDescription| d.name == desc.name) {
                    Some(existing) => *existing = desc,
                    None => descriptions.push(desc),
                }
            }
        }

        Self { tools, descriptions }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Component>> {
        self.tools.get(name)
    }

    pub fn descriptions(&self) -> &[ToolDescription] {
        &self.descriptions
    }
}

struct ToolResult {
    text: String,
    is_final: bool,
    artifacts: serde_json::Map<String, Value>,
}

struct LoopOutcome {
    history: Vec<ChatMessage>,
    output: String,
    is_final: bool,
    artifacts: serde_json::Map<String, Value>,
    /// The structured answer's own field map, set only when the loop ended
    /// via a `chat_formatting_output_tool` call.
    structured_output: Option<serde_json::Map<String, Value>>,
}

/// Folds `child`'s artifacts into `acc`. `sources` concatenates across calls
/// (each tool call's retrieved sources are appended, in call order); every
/// other key is overwritten by the later value.
fn merge_artifacts(acc: &mut serde_json::Map<String, Value>, child: &serde_json::Map<String, Value>) {
    for (key, value) in child {
        if key == "sources" {
            let mut combined = acc.get("sources").and_then(Value::as_array).cloned().unwrap_or_default();
            if let Some(more) = value.as_array() {
                combined.extend(more.iter().cloned());
            }
            acc.insert("sources".to_string(), Value::Array(combined));
        } else {
            acc.insert(key.clone(), value.clone());
        }
    }
}

/// Mines `artifacts.images` out of a message whose content happens to be a
/// JSON object, as emitted by image-generating tools. Returns an empty list
/// for plain-text content or content without that shape.
fn images_from_message(message: &ChatMessage) -> Vec<Value> {
    let text = message.to_string_lossy();
    if !text.contains('}') {
        return Vec::new();
    }
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.get("artifacts")?.get("images").cloned())
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default()
}

/// A bounded tool-use loop presented to the rest of the graph as one
/// ordinary [`Component`]: accepts a message history, repeatedly lets the
/// model call tools from its [`ToolRegistry`], and returns the final answer
/// once the model stops calling tools, a shortcut tool fires, or the
/// iteration budget runs out.
pub struct AgenticLoopComponent {
    id: String,
    completion: Arc<dyn CompletionService>,
    registry: ToolRegistry,
    options: ReactOptions,
    sandbox: SharedSandbox,
    sandbox_factory: Option<Arc<dyn Fn() -> Result<Arc<dyn Sandbox>, AgentError> + Send + Sync>>,
}

impl AgenticLoopComponent {
    pub fn new(
        id: impl Into<String>,
        completion: Arc<dyn CompletionService>,
        registry: ToolRegistry,
        options: ReactOptions,
    ) -> Self {
        Self {
            id: id.into(),
            completion,
            registry,
            options,
            sandbox: SharedSandbox::new(),
            sandbox_factory: None,
        }
    }

    /// Supplies the factory used to lazily construct the shared sandbox the
    /// first time a code-runner tool (`python_code_interpreter`,
    /// `terminal_command`) is invoked this run.
    pub fn with_sandbox_factory(
        mut self,
        factory: impl Fn() -> Result<Arc<dyn Sandbox>, AgentError> + Send + Sync + 'static,
    ) -> Self {
        self.sandbox_factory = Some(Arc::new(factory));
        self
    }

    /// Builds the synthetic `chat_formatting_output_tool` description from
    /// `options.output_format`, offered to the model alongside the registry's
    /// own tools whenever a structured answer is requested.
    fn output_tool_description(&self) -> Option<ToolDescription> {
        let properties = self.options.output_format.as_ref()?;
        let mut desc = ToolDescription::new(OUTPUT_TOOL_NAME, OUTPUT_TOOL_DESCRIPTION);
        for (name, schema) in properties {
            desc = desc.with_property(name.clone(), schema.clone(), true);
        }
        Some(desc)
    }

    fn history_handler(&self) -> HistoryMessageHandler {
        HistoryMessageHandler::new(self.options.first_history_messages, self.options.last_history_messages)
    }

    fn upsert_system_message(&self, history: &mut Vec<ChatMessage>, content: String) {
        let content = if self.options.date_in_system_prompt {
            format!("{content}\n\nToday's date is {}.", chrono::Utc::now().date_naive())
        } else {
            content
        };
        match history.first_mut() {
            Some(first) if first.role == Role::System => *first = ChatMessage::system(content),
            _ => history.insert(0, ChatMessage::system(content)),
        }
    }

    async fn call_one_tool(&self, call: &crate::data::ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name).cloned() else {
            return ToolResult {
                text: format!("tool '{}' not found in registry", call.name),
                is_final: false,
                artifacts: serde_json::Map::new(),
            };
        };

        if CODE_RUNNER_TOOLS.contains(&call.name.as_str()) {
            if let Some(factory) = self.sandbox_factory.clone() {
                if let Err(e) = self.sandbox.ensure(move || factory()).await {
                    return ToolResult {
                        text: format!("sandbox error: {e}"),
                        is_final: false,
                        artifacts: serde_json::Map::new(),
                    };
                }
            }
        }

        let input = NodeData {
            data: object_to_map(&call.arguments),
            ctx: HashMap::new(),
        };
        let contract = ComponentContract::new(tool.as_ref());
        let trace = crate::component::TraceSink::default();
        match contract.run(input, &trace).await {
            Ok(output) => {
                let text = output
                    .data
                    .get("output")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| serde_json::to_string(&output.data).unwrap_or_default());
                let is_final = output.data.get("is_final").and_then(Value::as_bool).unwrap_or(false);
                let artifacts = output
                    .data
                    .get("artifacts")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                ToolResult { text, is_final, artifacts }
            }
            Err(e) => ToolResult {
                text: format!("tool '{}' call failed: {e}", call.name),
                is_final: false,
                artifacts: serde_json::Map::new(),
            },
        }
    }

    async fn dispatch_tool_calls(&self, calls: &[crate::data::ToolCall]) -> Vec<ToolResult> {
        if self.options.run_tools_in_parallel {
            join_all(calls.iter().map(|c| self.call_one_tool(c))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.call_one_tool(call).await);
            }
            results
        }
    }

    fn run_inner<'a>(
        &'a self,
        mut history: Vec<ChatMessage>,
        iteration: usize,
        mut artifacts: serde_json::Map<String, Value>,
    ) -> BoxFuture<'a, Result<LoopOutcome, AgentError>> {
        Box::pin(async move {
            let truncated = self.history_handler().get_truncated_messages_history(&history);
            let tool_choice = if iteration + 1 < self.options.max_iterations {
                ToolChoice::Auto
            } else {
                ToolChoice::None
            };

            let output_tool = self.output_tool_description();
            let mut descriptions = self.registry.descriptions().to_vec();
            if let Some(desc) = &output_tool {
                descriptions.push(desc.clone());
            }

            let span = tracing::info_span!(
                "Agentic reflexion",
                model = %self.completion.model_name(),
                iteration = iteration,
            );
            let response = self
                .completion
                .function_call(&truncated, &descriptions, tool_choice)
                .instrument(span)
                .await?;

            if response.tool_calls.is_empty() {
                let mut output = response.content;
                if let Some(sources) = artifacts.get("sources").and_then(Value::as_array).cloned() {
                    if !sources.is_empty() {
                        let (renumbered, kept) = renumber_citations(&output, &sources);
                        output = renumbered;
                        artifacts.insert("sources".to_string(), Value::Array(kept));
                    }
                }
                let images = truncated.last().map(images_from_message).unwrap_or_default();
                if !images.is_empty() {
                    artifacts.insert("images".to_string(), Value::Array(images));
                }
                history.push(ChatMessage::assistant(output.clone()));
                return Ok(LoopOutcome {
                    history,
                    output,
                    is_final: true,
                    artifacts,
                    structured_output: None,
                });
            }

            let mut calls = response.tool_calls;

            if output_tool.is_some() {
                if let Some(call) = calls.iter().find(|c| c.name == OUTPUT_TOOL_NAME) {
                    let fields = call.arguments.as_object().cloned().unwrap_or_default();
                    let output = serde_json::to_string(&Value::Object(fields.clone()))
                        .unwrap_or_else(|_| "{}".to_string());
                    history.push(ChatMessage::assistant_tool_calls(vec![call.clone()]));
                    history.push(ChatMessage::tool(call.id.clone(), output.clone()));
                    return Ok(LoopOutcome {
                        history,
                        output,
                        is_final: true,
                        artifacts,
                        structured_output: Some(fields),
                    });
                }
            }
            if calls.len() > self.options.max_tools_per_iteration {
                warn!(
                    requested = calls.len(),
                    cap = self.options.max_tools_per_iteration,
                    "clipping tool calls to per-iteration cap"
                );
                calls.truncate(self.options.max_tools_per_iteration);
            }

            history.push(ChatMessage::assistant_tool_calls(calls.clone()));
            let results = self.dispatch_tool_calls(&calls).await;

            let mut shortcut: Option<String> = None;
            let mut final_count = 0;
            for (call, result) in calls.iter().zip(results.iter()) {
                history.push(ChatMessage::tool(call.id.clone(), result.text.clone()));
                merge_artifacts(&mut artifacts, &result.artifacts);
                if result.is_final {
                    final_count += 1;
                    shortcut = Some(result.text.clone());
                }
            }

            if final_count == 1 && self.options.allow_tool_shortcuts {
                return Ok(LoopOutcome {
                    history,
                    output: shortcut.unwrap_or_default(),
                    is_final: true,
                    artifacts,
                    structured_output: None,
                });
            }

            if iteration + 1 < self.options.max_iterations {
                self.run_inner(history, iteration + 1, artifacts).await
            } else {
                Ok(LoopOutcome {
                    history,
                    output: self.options.fallback_react_answer.clone().unwrap_or_default(),
                    is_final: false,
                    artifacts,
                    structured_output: None,
                })
            }
        })
    }

    async fn run_loop(&self, history: Vec<ChatMessage>) -> Result<LoopOutcome, AgentError> {
        let outcome = self.run_inner(history, 0, serde_json::Map::new()).await;
        self.sandbox.cleanup().await;
        outcome
    }
}

fn object_to_map(value: &Value) -> HashMap<String, Value> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => HashMap::new(),
    }
}

#[async_trait]
impl Component for AgenticLoopComponent {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_inputs_schema(&self) -> StructuredType {
        single_port_schema(&self.options.input_data_field_for_messages_history, PortType::Messages, false)
    }

    fn get_outputs_schema(&self) -> StructuredType {
        let mut schema = StructuredType::new()
            .with_port("output", PortSchema::required(PortType::String))
            .with_port("messages", PortSchema::required(PortType::Messages))
            .with_port("full_message", PortSchema::required(PortType::Json))
            .with_port("is_final", PortSchema::required(PortType::Bool))
            .with_port("artifacts", PortSchema::required(PortType::Mapping));
        if let Some(properties) = &self.options.output_format {
            for (name, field_schema) in properties {
                schema = schema.with_port(name.clone(), PortSchema::optional(port_type_from_json_schema(field_schema)));
            }
        }
        schema
    }

    fn get_canonical_ports(&self) -> CanonicalPorts {
        CanonicalPorts {
            input: Some(self.options.input_data_field_for_messages_history.clone()),
            output: Some("output".to_string()),
        }
    }

    async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
        let field = &self.options.input_data_field_for_messages_history;
        let mut history: Vec<ChatMessage> = input
            .data
            .get(field)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        if let Some(template) = &self.options.initial_prompt {
            let filled = fill_prompt_template_with_priority(template, &self.id, &input.data, &input.ctx)
                .map_err(|e| ComponentError::execution(self.id.clone(), e.to_string()))?;
            self.upsert_system_message(&mut history, filled);
        }

        let outcome = self
            .run_loop(history)
            .await
            .map_err(|e| ComponentError::execution(self.id.clone(), e.to_string()))?;

        let full_message = ChatMessage::assistant(outcome.output.clone());

        let mut out = NodeData::new();
        out.insert("output", Value::String(outcome.output));
        out.insert(
            "messages",
            serde_json::to_value(&outcome.history).unwrap_or(Value::Array(Vec::new())),
        );
        out.insert(
            "full_message",
            serde_json::to_value(&full_message).unwrap_or(Value::Null),
        );
        out.insert("is_final", Value::Bool(outcome.is_final));
        out.insert("artifacts", Value::Object(outcome.artifacts));
        if let Some(fields) = outcome.structured_output {
            for (key, value) in fields {
                out.insert(key, value);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockCompletionService;

    struct Echo {
        id: String,
    }

    #[async_trait]
    impl Component for Echo {
        fn id(&self) -> &str {
            &self.id
        }
        fn get_inputs_schema(&self) -> StructuredType {
            StructuredType::new().with_port("text", PortSchema::optional(PortType::String))
        }
        fn get_outputs_schema(&self) -> StructuredType {
            StructuredType::new().with_port("output", PortSchema::required(PortType::String))
        }
        fn tool_description(&self) -> Option<ToolDescription> {
            Some(
                ToolDescription::new("echo", "echoes the given text")
                    .with_property("text", serde_json::json!({"type": "string"}), true),
            )
        }
        async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
            let text = input.data.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(NodeData::with_field("output", format!("echoed: {text}")))
        }
    }

    #[tokio::test]
    async fn single_tool_call_then_final_answer() {
        let completion = Arc::new(MockCompletionService::first_tool_then_end(
            "echo",
            serde_json::json!({"text": "hi"}),
            "final answer",
        ));
        let registry = ToolRegistry::build(vec![Arc::new(Echo { id: "echo".into() }) as Arc<dyn Component>]).await;
        let agent = AgenticLoopComponent::new("agent", completion, registry, ReactOptions::default());

        let input = NodeData::with_field(
            "messages",
            serde_json::to_value(vec![ChatMessage::user("hello")]).unwrap(),
        );
        let output = agent.run(input).await.unwrap();
        assert_eq!(output.data.get("output").unwrap(), "final answer");
        assert_eq!(output.data.get("is_final").unwrap(), true);
    }

    #[tokio::test]
    async fn unknown_tool_produces_tool_error_message_and_continues() {
        let completion = Arc::new(MockCompletionService::first_tool_then_end(
            "missing_tool",
            serde_json::json!({}),
            "fallback",
        ));
        let registry = ToolRegistry::build(vec![]).await;
        let agent = AgenticLoopComponent::new("agent", completion, registry, ReactOptions::default());

        let input = NodeData::with_field(
            "messages",
            serde_json::to_value(vec![ChatMessage::user("hello")]).unwrap(),
        );
        let output = agent.run(input).await.unwrap();
        assert_eq!(output.data.get("output").unwrap(), "fallback");
    }

    struct Retriever {
        id: String,
        sources: Value,
    }

    #[async_trait]
    impl Component for Retriever {
        fn id(&self) -> &str {
            &self.id
        }
        fn get_inputs_schema(&self) -> StructuredType {
            StructuredType::new().with_port("query", PortSchema::optional(PortType::String))
        }
        fn get_outputs_schema(&self) -> StructuredType {
            StructuredType::new()
                .with_port("output", PortSchema::required(PortType::String))
                .with_port("artifacts", PortSchema::required(PortType::Mapping))
        }
        fn tool_description(&self) -> Option<ToolDescription> {
            Some(
                ToolDescription::new("retriever", "retrieves source chunks")
                    .with_property("query", serde_json::json!({"type": "string"}), true),
            )
        }
        async fn run(&self, _input: NodeData) -> Result<NodeData, ComponentError> {
            let mut out = NodeData::with_field("output", "chunks");
            out.insert(
                "artifacts",
                serde_json::json!({"sources": self.sources.clone()}),
            );
            Ok(out)
        }
    }

    /// Records the `tool_choice` each `function_call` was invoked with, then
    /// answers from a fixed queue like `MockCompletionService`.
    struct ToolChoiceSpy {
        seen: std::sync::Mutex<Vec<ToolChoice>>,
        responses: std::sync::Mutex<Vec<crate::llm::FunctionCallResponse>>,
    }

    #[async_trait]
    impl CompletionService for ToolChoiceSpy {
        fn model_name(&self) -> &str {
            "spy-model"
        }
        async fn function_call(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDescription],
            tool_choice: ToolChoice,
        ) -> Result<crate::llm::FunctionCallResponse, crate::llm::LlmError> {
            self.seen.lock().unwrap().push(tool_choice);
            Ok(self.responses.lock().unwrap().remove(0))
        }
        async fn completion(&self, _messages: &[ChatMessage]) -> Result<String, crate::llm::LlmError> {
            unimplemented!()
        }
        async fn structured_completion(&self, _messages: &[ChatMessage], _schema: &Value) -> Result<Value, crate::llm::LlmError> {
            unimplemented!()
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, crate::llm::LlmError> {
            unimplemented!()
        }
        async fn vision(&self, _images: &[Vec<u8>], _prompt: &str, _schema: Option<&Value>) -> Result<Value, crate::llm::LlmError> {
            unimplemented!()
        }
        async fn ocr(&self, _image: &[u8]) -> Result<String, crate::llm::LlmError> {
            unimplemented!()
        }
        async fn web_search(&self, _query: &str, _allowed_domains: Option<&[String]>) -> Result<Vec<Value>, crate::llm::LlmError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn tool_choice_is_none_only_on_the_last_allowed_iteration() {
        // max_iterations = 2: `Auto` on iteration 0 (one more turn remains),
        // `None` on iteration 1 (the last allowed turn).
        let spy = Arc::new(ToolChoiceSpy {
            seen: std::sync::Mutex::new(Vec::new()),
            responses: std::sync::Mutex::new(vec![
                crate::llm::FunctionCallResponse {
                    content: String::new(),
                    tool_calls: vec![crate::data::ToolCall {
                        id: "call_0".to_string(),
                        name: "echo".to_string(),
                        arguments: serde_json::json!({"text": "hi"}),
                    }],
                },
                crate::llm::FunctionCallResponse {
                    content: "done".to_string(),
                    tool_calls: vec![],
                },
            ]),
        });
        let registry = ToolRegistry::build(vec![Arc::new(Echo { id: "echo".into() }) as Arc<dyn Component>]).await;
        let options = ReactOptions::default().with_max_iterations(2);
        let agent = AgenticLoopComponent::new("agent", spy.clone(), registry, options);

        let input = NodeData::with_field(
            "messages",
            serde_json::to_value(vec![ChatMessage::user("hello")]).unwrap(),
        );
        let output = agent.run(input).await.unwrap();
        assert_eq!(output.data.get("output").unwrap(), "done");
        assert_eq!(*spy.seen.lock().unwrap(), vec![ToolChoice::Auto, ToolChoice::None]);
    }

    #[tokio::test]
    async fn retriever_sources_merge_into_artifacts_and_renumber_citations() {
        let sources = serde_json::json!([{"name": "a"}, {"name": "b"}]);
        let completion = Arc::new(MockCompletionService::new(vec![
            crate::llm::FunctionCallResponse {
                content: String::new(),
                tool_calls: vec![crate::data::ToolCall {
                    id: "call_0".to_string(),
                    name: "retriever".to_string(),
                    arguments: serde_json::json!({"query": "q"}),
                }],
            },
            crate::llm::FunctionCallResponse {
                content: "See [2] and [1].".to_string(),
                tool_calls: vec![],
            },
        ]));
        let registry = ToolRegistry::build(vec![Arc::new(Retriever {
            id: "retriever".into(),
            sources: sources.clone(),
        }) as Arc<dyn Component>])
        .await;
        let agent = AgenticLoopComponent::new("agent", completion, registry, ReactOptions::default());

        let input = NodeData::with_field(
            "messages",
            serde_json::to_value(vec![ChatMessage::user("find something")]).unwrap(),
        );
        let output = agent.run(input).await.unwrap();
        assert_eq!(output.data.get("output").unwrap(), "See [1] and [2].");
        let artifacts = output.data.get("artifacts").unwrap().as_object().unwrap();
        assert_eq!(artifacts.get("sources").unwrap(), &serde_json::json!([{"name": "b"}, {"name": "a"}]));
        let full_message = output.data.get("full_message").unwrap();
        assert_eq!(full_message.get("content").unwrap(), "See [1] and [2].");
    }

    #[tokio::test]
    async fn structured_output_tool_call_short_circuits_with_fields() {
        let completion = Arc::new(MockCompletionService::first_tool_then_end(
            OUTPUT_TOOL_NAME,
            serde_json::json!({"answer": "42", "confidence": 0.9}),
            "unused",
        ));
        let registry = ToolRegistry::build(vec![]).await;
        let mut output_format = std::collections::BTreeMap::new();
        output_format.insert("answer".to_string(), serde_json::json!({"type": "string"}));
        output_format.insert("confidence".to_string(), serde_json::json!({"type": "number"}));
        let options = ReactOptions::default().with_output_format(output_format);
        let agent = AgenticLoopComponent::new("agent", completion, registry, options);

        let input = NodeData::with_field(
            "messages",
            serde_json::to_value(vec![ChatMessage::user("what is the answer?")]).unwrap(),
        );
        let output = agent.run(input).await.unwrap();
        assert_eq!(output.data.get("is_final").unwrap(), true);
        assert_eq!(output.data.get("answer").unwrap(), "42");
        assert_eq!(output.data.get("confidence").unwrap(), 0.9);
        let expected: Value = serde_json::json!({"answer": "42", "confidence": 0.9});
        let actual: Value = serde_json::from_str(output.data.get("output").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(actual, expected);
    }
}
