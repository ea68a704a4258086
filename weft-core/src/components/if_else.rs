//! The IfElse component: evaluates a left-to-right chain of conditions and
//! halts its own downstream edges when the chain is false.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{CanonicalPorts, Component, ComponentError, Directive};
use crate::data::NodeData;
use crate::schema::{PortSchema, PortType, StructuredType};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfElseOperator {
    IsEmpty,
    IsNotEmpty,
    NumberGreaterThan,
    NumberLessThan,
    NumberEqualTo,
    NumberGreaterOrEqual,
    NumberLessOrEqual,
    BooleanIsTrue,
    BooleanIsFalse,
    TextContains,
    TextDoesNotContain,
    TextEquals,
    TextDoesNotEqual,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Condition {
    pub value_a: Value,
    pub operator: IfElseOperator,
    #[serde(default)]
    pub value_b: Option<Value>,
    /// How this condition's result combines with the *next* condition in the
    /// chain; `None` on the last condition (or treated as `And` mid-chain).
    #[serde(default)]
    pub next_logic: Option<LogicOp>,
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn as_number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn evaluate_one(condition: &Condition) -> bool {
    let a = &condition.value_a;
    let b = condition.value_b.as_ref();
    match condition.operator {
        IfElseOperator::IsEmpty => is_empty(a),
        IfElseOperator::IsNotEmpty => !is_empty(a),
        IfElseOperator::NumberGreaterThan => as_number(a) > b.map(as_number).unwrap_or(0.0),
        IfElseOperator::NumberLessThan => as_number(a) < b.map(as_number).unwrap_or(0.0),
        IfElseOperator::NumberEqualTo => as_number(a) == b.map(as_number).unwrap_or(0.0),
        IfElseOperator::NumberGreaterOrEqual => as_number(a) >= b.map(as_number).unwrap_or(0.0),
        IfElseOperator::NumberLessOrEqual => as_number(a) <= b.map(as_number).unwrap_or(0.0),
        IfElseOperator::BooleanIsTrue => a.as_bool().unwrap_or(false),
        IfElseOperator::BooleanIsFalse => !a.as_bool().unwrap_or(true),
        IfElseOperator::TextContains => as_text(a).contains(&b.map(as_text).unwrap_or_default()),
        IfElseOperator::TextDoesNotContain => !as_text(a).contains(&b.map(as_text).unwrap_or_default()),
        IfElseOperator::TextEquals => as_text(a) == b.map(as_text).unwrap_or_default(),
        IfElseOperator::TextDoesNotEqual => as_text(a) != b.map(as_text).unwrap_or_default(),
    }
}

fn evaluate_chain(conditions: &[Condition]) -> bool {
    let mut result: Option<bool> = None;
    let mut pending_logic: Option<LogicOp> = None;
    for condition in conditions {
        let value = evaluate_one(condition);
        result = Some(match (result, pending_logic.take()) {
            (None, _) => value,
            (Some(prev), Some(LogicOp::And)) | (Some(prev), None) => prev && value,
            (Some(prev), Some(LogicOp::Or)) => prev || value,
        });
        pending_logic = condition.next_logic;
    }
    result.unwrap_or(false)
}

/// Evaluates `conditions` left to right; when the chain is true, passes
/// `output_value_if_true` through unchanged; when false, outputs `null` and
/// stamps a `HaltAll` directive so nothing downstream of `output` runs.
pub struct IfElse {
    id: String,
}

impl IfElse {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Component for IfElse {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_inputs_schema(&self) -> StructuredType {
        StructuredType::new()
            .with_port("conditions", PortSchema::required(PortType::Json))
            .with_port("output_value_if_true", PortSchema::optional(PortType::Json))
    }

    fn get_outputs_schema(&self) -> StructuredType {
        StructuredType::new()
            .with_port("result", PortSchema::required(PortType::Bool))
            .with_port("output", PortSchema::optional(PortType::Json))
            .with_port("should_halt", PortSchema::required(PortType::Bool))
    }

    fn get_canonical_ports(&self) -> CanonicalPorts {
        CanonicalPorts {
            input: Some("conditions".to_string()),
            output: Some("output".to_string()),
        }
    }

    async fn run(&self, input: NodeData) -> Result<NodeData, ComponentError> {
        let conditions: Vec<Condition> = input
            .data
            .get("conditions")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let result = evaluate_chain(&conditions);
        let output = if result {
            input.data.get("output_value_if_true").cloned().unwrap_or(Value::Null)
        } else {
            Value::Null
        };

        let mut out = NodeData::new();
        out.insert("result", Value::Bool(result));
        out.insert("output", output);
        out.insert("should_halt", Value::Bool(!result));
        if !result {
            out = out.with_directive(Directive::halt_all());
        }
        Ok(out)
    }
}
