//! Argument building for external tools.
//!
//! The argument vector is assembled in three passes:
//! 1. static templates from the manifest, with `{{param}}` substitution
//! 2. flags for non-positional parameters
//! 3. positional parameters ordered by index

use super::manifest::{ParamKind, ParamSpec, ToolManifest};
use crate::{ToolError, ToolResult};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Decimal places used for non-integral numbers.
const DECIMAL_PRECISION: usize = 6;

/// Render a value as a single command-line argument.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let f = n.as_f64().unwrap_or_default();
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", f as i64)
                } else {
                    format!("{:.*}", DECIMAL_PRECISION, f)
                }
            }
        }
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Empty values are skipped for `omit_empty` parameters.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Check required parameters and declared types.
pub fn validate(manifest: &ToolManifest, args: &Map<String, Value>) -> ToolResult<()> {
    for param in &manifest.parameters {
        match args.get(&param.name) {
            None | Some(Value::Null) => {
                if param.required && param.default.is_none() {
                    return Err(ToolError::validation(format!(
                        "missing required parameter '{}'",
                        param.name
                    )));
                }
            }
            Some(value) => {
                if !param.kind.accepts(value) {
                    return Err(ToolError::validation(format!(
                        "parameter '{}' must be of type {}",
                        param.name,
                        param.kind.schema_type()
                    )));
                }
                if param.required && param.kind == ParamKind::String {
                    if let Some(s) = value.as_str() {
                        if s.trim().is_empty() {
                            return Err(ToolError::validation(format!(
                                "parameter '{}' must not be blank",
                                param.name
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Build the argument vector for a call.
pub fn build_args(manifest: &ToolManifest, args: &Map<String, Value>) -> Vec<String> {
    let mut out = Vec::new();
    let mut consumed = HashSet::new();

    for template in &manifest.args {
        let (rendered, used) = substitute(template, |name| {
            lookup(manifest, args, name).map(stringify)
        });
        consumed.extend(used.iter().cloned());
        let only_placeholders = !used.is_empty() && rendered.is_empty();
        if !only_placeholders {
            out.push(rendered);
        }
    }

    for param in manifest.parameters.iter().filter(|p| p.position.is_none()) {
        if consumed.contains(&param.name) {
            continue;
        }
        let Some(value) = effective_value(param, args) else {
            continue;
        };
        match &param.flag {
            Some(template) if param.kind == ParamKind::Bool => {
                if value.as_bool() == Some(true) {
                    out.push(render_flag(template, value));
                }
            }
            Some(template) => out.push(render_flag(template, value)),
            None if param.kind == ParamKind::Bool => {
                if value.as_bool() == Some(true) {
                    out.push(format!("--{}", param.name));
                }
            }
            None => out.push(format!("--{}={}", param.name, stringify(value))),
        }
    }

    let mut positional: Vec<&ParamSpec> = manifest
        .parameters
        .iter()
        .filter(|p| p.position.is_some() && !consumed.contains(&p.name))
        .collect();
    positional.sort_by_key(|p| p.position);
    for param in positional {
        if let Some(value) = effective_value(param, args) {
            out.push(stringify(value));
        }
    }

    out
}

fn lookup<'a>(manifest: &'a ToolManifest, args: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    match manifest.parameters.iter().find(|p| p.name == name) {
        Some(param) => effective_value(param, args),
        None => args.get(name).filter(|v| !v.is_null()),
    }
}

/// Supplied value, else the default, honoring `omit_empty`.
fn effective_value<'a>(param: &'a ParamSpec, args: &'a Map<String, Value>) -> Option<&'a Value> {
    let value = args
        .get(&param.name)
        .filter(|v| !v.is_null())
        .or(param.default.as_ref())?;
    if param.omit_empty && is_empty_value(value) {
        return None;
    }
    Some(value)
}

fn render_flag(template: &str, value: &Value) -> String {
    substitute(template, |name| (name == "value").then(|| stringify(value))).0
}

/// Replace `{{name}}` placeholders. Unknown names render empty.
fn substitute(template: &str, mut resolve: impl FnMut(&str) -> Option<String>) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len());
    let mut used = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if let Some(value) = resolve(name) {
                    out.push_str(&value);
                }
                used.push(name.to_string());
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    (out, used)
}
