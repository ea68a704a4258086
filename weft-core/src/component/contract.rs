//! The uniform `run(NodeData) -> NodeData` dispatcher that wraps every
//! concrete [`Component`], providing tracing, input/output schema
//! validation, and a trace side-channel.

use std::sync::Mutex;

use serde_json::Value;

use crate::coercion::{coerce_missing, CoercionError};
use crate::data::NodeData;
use crate::schema::StructuredType;

use super::Component;

/// Errors surfaced at the component boundary. Fatal to the current run —
/// the contract wrapper does not retry (components may retry internally).
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("component '{component_id}': input validation failed: {source}")]
    InputValidation {
        component_id: String,
        #[source]
        source: CoercionError,
    },

    #[error("component '{component_id}': output port '{port}' does not match declared schema: {reason}")]
    OutputValidation {
        component_id: String,
        port: String,
        reason: String,
    },

    #[error("component '{component_id}': execution failed: {reason}")]
    Execution { component_id: String, reason: String },
}

impl ComponentError {
    pub fn execution(component_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            component_id: component_id.into(),
            reason: reason.into(),
        }
    }
}

/// Extra trace attributes/events a component emits via [`TraceSink`] during
/// `run`, flushed onto the open span by the contract wrapper after the
/// component returns.
#[derive(Default)]
pub struct TraceSink {
    attrs: Mutex<Vec<(String, Value)>>,
    events: Mutex<Vec<String>>,
}

impl TraceSink {
    pub fn log_trace(&self, attrs: impl IntoIterator<Item = (String, Value)>) {
        self.attrs.lock().unwrap().extend(attrs);
    }

    pub fn log_trace_event(&self, msg: impl Into<String>) {
        self.events.lock().unwrap().push(msg.into());
    }

    fn flush(&self, span: &tracing::Span) {
        for (k, v) in self.attrs.lock().unwrap().drain(..) {
            span.record("extra", tracing::field::display(format!("{k}={v}")));
        }
        for msg in self.events.lock().unwrap().drain(..) {
            tracing::event!(target: "weft_core::component", tracing::Level::DEBUG, message = %msg);
        }
    }
}

/// Wraps a [`Component`] with validation and tracing around a single `run`.
pub struct ComponentContract<'a> {
    component: &'a dyn Component,
}

impl<'a> ComponentContract<'a> {
    pub fn new(component: &'a dyn Component) -> Self {
        Self { component }
    }

    /// Validates `input.data` against `get_inputs_schema()`, runs the
    /// wrapped component inside a tracing span, then validates the returned
    /// `NodeData` against `get_outputs_schema()`.
    pub async fn run(&self, mut input: NodeData, trace: &TraceSink) -> Result<NodeData, ComponentError> {
        let component_id = self.component.id().to_string();
        let inputs_schema = self.component.get_inputs_schema();
        validate_schema(&component_id, &mut input, &inputs_schema)?;

        let span = tracing::info_span!(
            "component.run",
            span_kind = "component",
            component_id = %component_id,
            input_value = %truncated_preview(&input),
            output_value = tracing::field::Empty,
            extra = tracing::field::Empty,
        );
        let _guard = span.enter();

        let result = self.component.run(input).await;
        drop(_guard);

        match result {
            Ok(output) => {
                let outputs_schema = self.component.get_outputs_schema();
                validate_output_schema(&component_id, &output, &outputs_schema)?;
                span.record("output_value", tracing::field::display(truncated_preview(&output)));
                trace.flush(&span);
                Ok(output)
            }
            Err(e) => {
                tracing::error!(component_id = %component_id, error = %e, "component execution failed");
                trace.flush(&span);
                Err(e)
            }
        }
    }
}

fn truncated_preview(data: &NodeData) -> String {
    let s = serde_json::to_string(&data.data).unwrap_or_default();
    if s.len() > 500 {
        format!("{}...", &s[..500])
    } else {
        s
    }
}

/// Input validation: every required, non-disabled port must resolve to a
/// value (present or defaulted). Coercion across ports already happened
/// upstream in the Graph Runner; this pass fills in missing-but-defaulted
/// or nullable ports (mutating `input` in place) and rejects missing
/// required ones, naming the failing component.
fn validate_schema(
    component_id: &str,
    input: &mut NodeData,
    schema: &StructuredType,
) -> Result<(), ComponentError> {
    for (name, port_schema) in &schema.ports {
        if port_schema.disabled_as_input {
            continue;
        }
        if input.data.contains_key(name) {
            continue;
        }
        let value = coerce_missing(name, port_schema).map_err(|source| ComponentError::InputValidation {
            component_id: component_id.to_string(),
            source,
        })?;
        input.data.insert(name.clone(), value);
    }
    Ok(())
}

fn validate_output_schema(
    component_id: &str,
    output: &NodeData,
    schema: &StructuredType,
) -> Result<(), ComponentError> {
    for (name, port_schema) in &schema.ports {
        if port_schema.required && !port_schema.nullable && !output.data.contains_key(name) {
            return Err(ComponentError::OutputValidation {
                component_id: component_id.to_string(),
                port: name.clone(),
                reason: "required output port missing from component's return value".into(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::CanonicalPorts;
    use crate::schema::{PortSchema, PortType};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Component for Echo {
        fn id(&self) -> &str {
            "echo"
        }
        fn get_inputs_schema(&self) -> StructuredType {
            StructuredType::new().with_port("text", PortSchema::required(PortType::String))
        }
        fn get_outputs_schema(&self) -> StructuredType {
            StructuredType::new().with_port("text", PortSchema::required(PortType::String))
        }
        fn get_canonical_ports(&self) -> CanonicalPorts {
            CanonicalPorts {
                input: Some("text".into()),
                output: Some("text".into()),
            }
        }
        async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
            Ok(input)
        }
    }

    struct Silent;

    #[async_trait]
    impl Component for Silent {
        fn id(&self) -> &str {
            "silent"
        }
        fn get_inputs_schema(&self) -> StructuredType {
            StructuredType::new()
        }
        fn get_outputs_schema(&self) -> StructuredType {
            StructuredType::new().with_port("text", PortSchema::required(PortType::String))
        }
        async fn run(&self, _input: NodeData) -> Result<NodeData, ComponentError> {
            Ok(NodeData::new())
        }
    }

    #[tokio::test]
    async fn missing_required_input_is_rejected_naming_component() {
        let echo = Echo;
        let contract = ComponentContract::new(&echo);
        let trace = TraceSink::default();
        let err = contract.run(NodeData::new(), &trace).await.unwrap_err();
        match err {
            ComponentError::InputValidation { component_id, .. } => {
                assert_eq!(component_id, "echo");
            }
            other => panic!("expected InputValidation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn valid_input_passes_through() {
        let echo = Echo;
        let contract = ComponentContract::new(&echo);
        let trace = TraceSink::default();
        let out = contract
            .run(NodeData::with_field("text", "hi"), &trace)
            .await
            .unwrap();
        assert_eq!(out.data.get("text").unwrap(), "hi");
    }

    #[tokio::test]
    async fn missing_required_output_is_rejected() {
        let silent = Silent;
        let contract = ComponentContract::new(&silent);
        let trace = TraceSink::default();
        let err = contract.run(NodeData::new(), &trace).await.unwrap_err();
        assert!(matches!(err, ComponentError::OutputValidation { .. }));
    }
}
