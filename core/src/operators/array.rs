//! Array operator builders for list-typed fields.

use super::MAX_ARRAY_SIZE;
use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::params::ParamStore;
use crate::value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOp {
    Has,
    HasSome,
    HasEvery,
    IsEmpty,
}

impl ArrayOp {
    pub fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "has" => ArrayOp::Has,
            "hasSome" => ArrayOp::HasSome,
            "hasEvery" => ArrayOp::HasEvery,
            "isEmpty" => ArrayOp::IsEmpty,
            _ => return None,
        })
    }
}

pub fn compile_object(
    field_expr: &str,
    obj: &serde_json::Map<String, serde_json::Value>,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    path: &str,
) -> Result<String, CompileError> {
    let mut fragments = Vec::new();
    for (key, raw_value) in obj {
        let Some(op) = ArrayOp::parse(key) else {
            return Err(CompileError::unknown_operator(key.as_str(), path));
        };
        fragments.push(compile_one(field_expr, op, raw_value, store, adapter, path)?);
    }
    if fragments.is_empty() {
        return Ok("1=1".to_string());
    }
    Ok(fragments.join(" AND "))
}

fn check_len(raw_value: &serde_json::Value, path: &str) -> Result<(), CompileError> {
    if let serde_json::Value::Array(items) = raw_value {
        if items.len() > MAX_ARRAY_SIZE {
            return Err(CompileError::resource_limit(
                format!("array operand exceeds {MAX_ARRAY_SIZE} elements"),
                path,
            ));
        }
    }
    Ok(())
}

fn compile_one(
    field_expr: &str,
    op: ArrayOp,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    path: &str,
) -> Result<String, CompileError> {
    check_len(raw_value, path)?;
    match op {
        ArrayOp::Has => {
            let value = value::coerce(raw_value)?;
            let placeholder = store.add_auto(adapter, value::Value::List(vec![value]))?;
            Ok(adapter.array_overlaps(field_expr, &placeholder))
        }
        ArrayOp::HasSome => {
            let value = value::coerce(raw_value)?;
            let placeholder = store.add_auto(adapter, value)?;
            Ok(adapter.array_overlaps(field_expr, &placeholder))
        }
        ArrayOp::HasEvery => {
            let value = value::coerce(raw_value)?;
            let placeholder = store.add_auto(adapter, value)?;
            Ok(adapter.array_contains_all(field_expr, &placeholder))
        }
        ArrayOp::IsEmpty => {
            let serde_json::Value::Bool(is_empty) = raw_value else {
                return Err(CompileError::invalid_argument("isEmpty expects a boolean", path));
            };
            Ok(if *is_empty {
                adapter.array_is_empty(field_expr)
            } else {
                adapter.array_is_not_empty(field_expr)
            })
        }
    }
}
