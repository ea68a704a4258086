//! Port schemas ([`StructuredType`], [`PortSchema`]) and tool descriptions
//! ([`ToolDescription`]) — the typed-record surface every [`Component`](crate::component::Component)
//! exposes for its inputs and outputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The declared type of a port. Coarse enough for the coercion matrix to
/// pattern-match on; component authors may carry a `serde_json::Value`
/// schema fragment alongside for LLM-facing tool parameter descriptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    String,
    Int,
    Float,
    Bool,
    Messages,
    Mapping,
    Record(String),
    Json,
}

/// One named port in a [`StructuredType`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortSchema {
    pub ty: PortType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// UI hints are opaque to the core; carried through for loader/frontend use.
    #[serde(default)]
    pub ui_hints: Option<Value>,
    /// Port exists in the schema but is not wired from upstream; its value is
    /// supplied at component construction time instead.
    #[serde(default)]
    pub disabled_as_input: bool,
    /// Whether LLM function-calling should expose this port as a parameter.
    #[serde(default)]
    pub is_tool_input: bool,
}

impl PortSchema {
    pub fn required(ty: PortType) -> Self {
        Self {
            ty,
            required: true,
            nullable: false,
            default: None,
            ui_hints: None,
            disabled_as_input: false,
            is_tool_input: false,
        }
    }

    pub fn optional(ty: PortType) -> Self {
        Self {
            ty,
            required: false,
            nullable: true,
            default: None,
            ui_hints: None,
            disabled_as_input: false,
            is_tool_input: false,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn as_tool_input(mut self) -> Self {
        self.is_tool_input = true;
        self
    }
}

/// A typed record describing a component's named input or output ports.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StructuredType {
    pub ports: BTreeMap<String, PortSchema>,
}

impl StructuredType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, name: impl Into<String>, schema: PortSchema) -> Self {
        self.ports.insert(name.into(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PortSchema> {
        self.ports.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    /// The sole port, if this record declares exactly one.
    pub fn sole_port(&self) -> Option<&str> {
        if self.ports.len() == 1 {
            self.ports.keys().next().map(String::as_str)
        } else {
            None
        }
    }

    /// True for a passthrough controller's output schema (Router, IfElse):
    /// no ports of its own, since its job is to stamp a directive rather
    /// than emit data.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

/// `(name, description, tool_properties, required)` — what an LLM's
/// function-calling API sees for one callable tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    /// parameter-name -> JSON-schema fragment.
    pub tool_properties: BTreeMap<String, Value>,
    pub required: Vec<String>,
}

impl ToolDescription {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tool_properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        schema: Value,
        required: bool,
    ) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.tool_properties.insert(name, schema);
        self
    }

    /// Renders this description as the JSON-schema function spec most
    /// `function_call`-style completion APIs expect.
    pub fn as_json_schema(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": self.tool_properties,
                "required": self.required,
            }
        })
    }
}

/// Derives a [`StructuredType`] with a single port named `port`, convenient
/// for single-port legacy-style components.
pub fn single_port_schema(port: &str, ty: PortType, required: bool) -> StructuredType {
    let schema = if required {
        PortSchema::required(ty)
    } else {
        PortSchema::optional(ty)
    };
    StructuredType::new().with_port(port, schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sole_port_returns_none_when_not_exactly_one() {
        let empty = StructuredType::new();
        assert_eq!(empty.sole_port(), None);

        let two = StructuredType::new()
            .with_port("a", PortSchema::required(PortType::String))
            .with_port("b", PortSchema::required(PortType::String));
        assert_eq!(two.sole_port(), None);

        let one = StructuredType::new().with_port("a", PortSchema::required(PortType::String));
        assert_eq!(one.sole_port(), Some("a"));
    }

    #[test]
    fn tool_description_json_schema_lists_required() {
        let desc = ToolDescription::new("echo", "echoes text").with_property(
            "text",
            serde_json::json!({"type": "string"}),
            true,
        );
        let schema = desc.as_json_schema();
        assert_eq!(schema["name"], "echo");
        assert_eq!(schema["parameters"]["required"][0], "text");
    }
}
