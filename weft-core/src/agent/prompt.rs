//! Prompt template filling with input-then-context priority. Placeholders
//! are `{name}` spans; `{{`/`}}` escape to literal braces.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum PromptTemplateError {
    #[error(
        "missing template variable '{key}' needed in prompt template of component '{component}'. \
         available template vars: {available:?}"
    )]
    MissingKey {
        component: String,
        key: String,
        available: Vec<String>,
    },
}

/// Placeholder names found in `template`, in first-seen order, ignoring
/// escaped `{{`/`}}` pairs.
fn extract_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => i += 2,
            '}' if chars.get(i + 1) == Some(&'}') => i += 2,
            '{' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != '}' {
                    j += 1;
                }
                let name: String = chars[start..j].iter().collect();
                if !name.is_empty() && seen.insert(name.clone()) {
                    names.push(name);
                }
                i = j + 1;
            }
            _ => i += 1,
        }
    }
    names
}

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fills `template`'s `{var}` placeholders from `inputs` first, falling back
/// to `ctx`. Errors if a placeholder is in neither map.
pub fn fill_prompt_template_with_priority(
    template: &str,
    component_name: &str,
    inputs: &HashMap<String, Value>,
    ctx: &HashMap<String, Value>,
) -> Result<String, PromptTemplateError> {
    let placeholders = extract_placeholders(template);
    if placeholders.is_empty() {
        return Ok(template.to_string());
    }

    let mut replacements: HashMap<String, String> = HashMap::new();
    for key in &placeholders {
        let value = inputs.get(key).or_else(|| ctx.get(key));
        match value {
            Some(v) => {
                replacements.insert(key.clone(), value_to_plain_string(v));
            }
            None => {
                let mut available: Vec<String> =
                    inputs.keys().chain(ctx.keys()).cloned().collect::<HashSet<_>>().into_iter().collect();
                available.sort();
                return Err(PromptTemplateError::MissingKey {
                    component: component_name.to_string(),
                    key: key.clone(),
                    available,
                });
            }
        }
    }

    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                out.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                out.push('}');
                i += 2;
            }
            '{' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != '}' {
                    j += 1;
                }
                let name: String = chars[start..j].iter().collect();
                out.push_str(&replacements[&name]);
                i = j + 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}
