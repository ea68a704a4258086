//! The Type Coercion Matrix: decides whether a value declared as
//! `source_type` may flow into a port declared as `target_type`, and
//! performs the conversion.
//!
//! `check` is the build-time, value-free half used by the Port-Mapping
//! Resolver; `coerce` is the runtime half used by the Graph Runner for each
//! edge. Both walk the same match arms so that every mapping accepted at
//! build time succeeds at runtime for a well-formed value, by construction
//! rather than by convention.

use serde_json::Value;

use crate::data::{ChatMessage, MessageContent, Role};
use crate::schema::{PortSchema, PortType};

/// A coercion failure: both types, a redacted preview of the offending
/// value, and a human-readable reason. Named field-by-field (rather than one
/// opaque message) so callers can match on `source_type`/`target_type`
/// without parsing the display string.
#[derive(Debug, thiserror::Error)]
#[error("cannot coerce {source_type:?} -> {target_type:?}: {reason} (value: {value_preview})")]
pub struct CoercionError {
    pub source_type: PortType,
    pub target_type: PortType,
    pub value_preview: String,
    pub reason: String,
}

impl CoercionError {
    fn new(source: &PortType, target: &PortType, value: &Value, reason: impl Into<String>) -> Self {
        let preview = serde_json::to_string(value).unwrap_or_default();
        let preview = if preview.len() > 200 {
            format!("{}...", &preview[..200])
        } else {
            preview
        };
        Self {
            source_type: source.clone(),
            target_type: target.clone(),
            value_preview: preview,
            reason: reason.into(),
        }
    }

    fn missing(target: &PortType, reason: impl Into<String>) -> Self {
        Self {
            source_type: target.clone(),
            target_type: target.clone(),
            value_preview: "<missing>".into(),
            reason: reason.into(),
        }
    }
}

/// Returns `true` if `source -> target` is an accepted conversion, without
/// requiring a runtime value. Used at graph-build time.
pub fn check(source: &PortType, target: &PortType) -> Result<(), CoercionError> {
    use PortType::*;
    let ok = match (source, target) {
        (a, b) if a == b => true,
        (String, Messages) | (Messages, String) => true,
        (Record(_), Mapping) | (Mapping, Record(_)) => true,
        (String, Mapping) | (String, Record(_)) => true,
        (Int, Float) => true,
        (Int, String) | (Float, String) | (String, String) => true,
        (String, Bool) => true,
        (Json, _) | (_, Json) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(CoercionError {
            source_type: source.clone(),
            target_type: target.clone(),
            value_preview: String::new(),
            reason: "no accepted conversion in the coercion matrix".into(),
        })
    }
}

/// Performs the coercion described by `check`, against an actual runtime value.
///
/// A coercion failure here is logged via `tracing::warn!` before being
/// returned — callers see the failure on the active span as well as in the
/// returned error.
pub fn coerce(source: &PortType, target: &PortType, value: Value) -> Result<Value, CoercionError> {
    let result = coerce_inner(source, target, &value);
    if let Err(ref e) = result {
        tracing::warn!(
            source_type = ?source,
            target_type = ?target,
            reason = %e.reason,
            "coercion failed"
        );
    }
    result
}

fn coerce_inner(source: &PortType, target: &PortType, value: &Value) -> Result<Value, CoercionError> {
    use PortType::*;
    if source == target {
        return Ok(value.clone());
    }
    match (source, target) {
        (Json, _) | (_, Json) => Ok(value.clone()),

        (Messages, String) => {
            let messages: Vec<ChatMessage> = serde_json::from_value(value.clone())
                .map_err(|e| CoercionError::new(source, target, value, e.to_string()))?;
            Ok(Value::String(messages_to_string(&messages)))
        }

        (String, Messages) => {
            let s = value
                .as_str()
                .ok_or_else(|| CoercionError::new(source, target, value, "expected a string"))?;
            let messages = vec![ChatMessage::user(s.to_string())];
            serde_json::to_value(messages)
                .map_err(|e| CoercionError::new(source, target, value, e.to_string()))
        }

        (Record(_), Mapping) => {
            if value.is_object() {
                Ok(value.clone())
            } else {
                Err(CoercionError::new(
                    source,
                    target,
                    value,
                    "record did not serialize to an object",
                ))
            }
        }

        (Mapping, Record(name)) => {
            if value.is_object() {
                Ok(value.clone())
            } else {
                Err(CoercionError::new(
                    source,
                    target,
                    value,
                    format!("value is not an object, cannot validate against record {name}"),
                ))
            }
        }

        (String, Mapping) | (String, Record(_)) => {
            let s = value
                .as_str()
                .ok_or_else(|| CoercionError::new(source, target, value, "expected a string"))?;
            parse_tolerant_json(s)
                .map_err(|e| CoercionError::new(source, target, value, e))
                .and_then(|parsed| {
                    if parsed.is_object() {
                        Ok(parsed)
                    } else {
                        Err(CoercionError::new(
                            source,
                            target,
                            value,
                            "parsed JSON is not an object",
                        ))
                    }
                })
        }

        (Int, Float) => {
            let i = value
                .as_i64()
                .ok_or_else(|| CoercionError::new(source, target, value, "expected an int"))?;
            Ok(Value::from(i as f64))
        }

        (Int, String) | (Float, String) | (String, String) => Ok(Value::String(scalar_to_string(value))),

        (String, Bool) => {
            let s = value
                .as_str()
                .ok_or_else(|| CoercionError::new(source, target, value, "expected a string"))?;
            const TRUTHY: &[&str] = &["true", "1", "yes", "y", "on"];
            Ok(Value::Bool(TRUTHY.contains(&s.to_ascii_lowercase().as_str())))
        }

        _ => Err(CoercionError::new(
            source,
            target,
            value,
            "no accepted conversion in the coercion matrix",
        )),
    }
}

/// Resolves a missing source value against the target port's schema: a
/// nullable or defaulted port yields its default, otherwise the caller
/// should surface a coercion error naming the missing required field.
pub fn coerce_missing(port_name: &str, schema: &PortSchema) -> Result<Value, CoercionError> {
    if let Some(default) = &schema.default {
        return Ok(default.clone());
    }
    if schema.nullable {
        return Ok(Value::Null);
    }
    Err(CoercionError::missing(
        &schema.ty,
        format!("port '{port_name}' is required with no default and no value was supplied"),
    ))
}

fn messages_to_string(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .or_else(|| messages.last())
        .map(ChatMessage::to_string_lossy)
        .unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Parses JSON tolerant of a single trailing comma before `}` or `]`, the
/// leniency required on the `JSON string -> mapping` path.
fn parse_tolerant_json(s: &str) -> Result<Value, String> {
    match serde_json::from_str(s) {
        Ok(v) => Ok(v),
        Err(_) => {
            let cleaned = strip_trailing_commas(s);
            serde_json::from_str(&cleaned).map_err(|e| e.to_string())
        }
    }
}

fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ',' {
            let mut lookahead = chars.clone();
            while let Some(&next) = lookahead.peek() {
                if next.is_whitespace() {
                    lookahead.next();
                } else {
                    break;
                }
            }
            if matches!(lookahead.peek(), Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
