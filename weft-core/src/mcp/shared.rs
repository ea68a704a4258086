//! Helpers shared by both MCP tool backends: `process_mcp_result`
//! (normalize an MCP `tools/call` result into output text + raw content +
//! error flag) and `convert_tool_to_description` (MCP SDK tool metadata ->
//! [`ToolDescription`]).

use std::collections::HashMap;

use serde_json::Value;

use crate::schema::ToolDescription;

/// Normalizes a `tools/call` JSON-RPC `result` object into `(output, content,
/// is_error)`. Text content blocks are joined with `"\n"`; when there is no
/// text output at all, falls back to a small JSON status envelope so callers
/// never see an empty tool result.
pub fn process_mcp_result(result_value: &Value) -> (String, Vec<Value>, bool) {
    let is_error = result_value.get("isError").and_then(Value::as_bool).unwrap_or(false);
    let content_items: Vec<Value> = result_value
        .get("content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let text_parts: Vec<String> = content_items
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str).map(str::to_string))
        .collect();

    let mut output = text_parts.join("\n");
    if output.is_empty() {
        output = if is_error {
            serde_json::json!({"result": "error", "message": "MCP tool call failed with no output."}).to_string()
        } else {
            serde_json::json!({"result": "success"}).to_string()
        };
    }

    (output, content_items, is_error)
}

/// Builds a [`ToolDescription`] from an MCP SDK tool's `name`/`description`/
/// `inputSchema`. Returns `None` when the tool has no name (mirrors the
/// original's `if not tool.name: return None`).
pub fn convert_tool_to_description(
    name: Option<&str>,
    description: Option<&str>,
    input_schema: &Value,
) -> Option<ToolDescription> {
    let name = name?;
    let mut desc = ToolDescription::new(name, description.unwrap_or_default());

    if let Some(props) = input_schema.get("properties").and_then(Value::as_object) {
        let required: Vec<String> = input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        for (key, schema) in props {
            desc = desc.with_property(key.clone(), schema.clone(), required.contains(key));
        }
    }

    Some(desc)
}

/// Merges the caller-supplied `tool_arguments` object with any extra fields
/// present on the input record outside the disabled `tool_name`/
/// `tool_arguments` ports.
pub fn merge_tool_arguments(tool_arguments: &Value, extra: &HashMap<String, Value>) -> Value {
    let mut map = match tool_arguments {
        Value::Object(m) => m.clone(),
        _ => serde_json::Map::new(),
    };
    for (k, v) in extra {
        map.entry(k.clone()).or_insert_with(|| v.clone());
    }
    Value::Object(map)
}
