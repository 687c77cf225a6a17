//! JSON path operator builders.

use compact_str::CompactString;

use super::is_case_insensitive;
use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::params::ParamStore;
use crate::value::{self, Value};

const MAX_SEGMENTS: usize = 100;
const MAX_SEGMENT_LEN: usize = 255;

fn validate_segment(segment: &str, path: &str) -> Result<(), CompileError> {
    let mut chars = segment.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !ok || segment.len() > MAX_SEGMENT_LEN {
        return Err(CompileError::invalid_argument(
            format!("invalid JSON path segment `{segment}`"),
            path,
        ));
    }
    Ok(())
}

fn parse_segments(
    raw: &serde_json::Value,
    path: &str,
) -> Result<Vec<CompactString>, CompileError> {
    let serde_json::Value::Array(items) = raw else {
        return Err(CompileError::invalid_argument("path expects a list of segments", path));
    };
    if items.len() > MAX_SEGMENTS {
        return Err(CompileError::resource_limit(
            format!("JSON path exceeds {MAX_SEGMENTS} segments"),
            path,
        ));
    }
    let mut segments = Vec::with_capacity(items.len());
    for item in items {
        let serde_json::Value::String(s) = item else {
            return Err(CompileError::invalid_argument("path segments must be strings", path));
        };
        validate_segment(s, path)?;
        segments.push(CompactString::from(s.as_str()));
    }
    Ok(segments)
}

/// Compiles `{ path: [...], <op>: value }` against a JSON-typed field.
pub fn compile_path_object(
    field_expr: &str,
    obj: &serde_json::Map<String, serde_json::Value>,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    path: &str,
) -> Result<String, CompileError> {
    let segments = match obj.get("path") {
        Some(raw) => parse_segments(raw, path)?,
        None => {
            return Err(CompileError::invalid_argument("json path filter requires `path`", path));
        }
    };
    let path_value = adapter.encode_json_path(&segments);
    let path_placeholder = store.add_static(adapter, path_value)?;
    let insensitive = is_case_insensitive(obj);

    let mut fragments = Vec::new();
    for (key, raw_value) in obj {
        if key == "path" || key == "mode" {
            continue;
        }
        match key.as_str() {
            "equals" | "gt" | "gte" | "lt" | "lte" => {
                let numeric = matches!(raw_value, serde_json::Value::Number(_));
                let extract = if numeric {
                    adapter.json_extract_numeric(field_expr, &path_placeholder)
                } else {
                    adapter.json_extract_text(field_expr, &path_placeholder)
                };
                let symbol = match key.as_str() {
                    "equals" => "=",
                    "gt" => ">",
                    "gte" => ">=",
                    "lt" => "<",
                    "lte" => "<=",
                    _ => unreachable!(),
                };
                let value = value::coerce(raw_value)?;
                let placeholder = store.add_auto(adapter, value)?;
                fragments.push(format!("{extract} {symbol} {placeholder}"));
            }
            "stringContains" | "stringStartsWith" | "stringEndsWith" => {
                let serde_json::Value::String(text) = raw_value else {
                    return Err(CompileError::invalid_argument(
                        "string JSON operators expect a string value",
                        path,
                    ));
                };
                let template = match key.as_str() {
                    "stringContains" => "%{}%",
                    "stringStartsWith" => "{}%",
                    "stringEndsWith" => "%{}",
                    _ => unreachable!(),
                };
                let wildcarded = template.replace("{}", text);
                let extract_text = adapter.json_extract_text(field_expr, &path_placeholder);
                let to_text = adapter.json_to_text(&extract_text);
                let placeholder = store.add_static(adapter, Value::Text(CompactString::from(wildcarded)))?;
                fragments.push(if insensitive {
                    adapter.case_insensitive_like(&to_text, &placeholder)
                } else {
                    format!("{to_text} LIKE {placeholder}")
                });
            }
            other => return Err(CompileError::unknown_operator(other, path)),
        }
    }

    if fragments.is_empty() {
        return Ok("1=1".to_string());
    }
    Ok(fragments.join(" AND "))
}
