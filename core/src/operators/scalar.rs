//! Scalar operator builders.

use compact_str::CompactString;

use super::{is_case_insensitive, MAX_NOT_DEPTH};
use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::params::ParamStore;
use crate::value::{self, Value};

/// Exhaustive tagged variant for scalar operators, replacing a
/// string-keyed dispatch table with one total match. Conversion from the
/// wire key happens once, at
/// [`ScalarOp::parse`], so downstream matching is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOp {
    Equals,
    Not,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
}

impl ScalarOp {
    pub fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "equals" => ScalarOp::Equals,
            "not" => ScalarOp::Not,
            "gt" => ScalarOp::Gt,
            "gte" => ScalarOp::Gte,
            "lt" => ScalarOp::Lt,
            "lte" => ScalarOp::Lte,
            "in" => ScalarOp::In,
            "notIn" => ScalarOp::NotIn,
            "contains" => ScalarOp::Contains,
            "startsWith" => ScalarOp::StartsWith,
            "endsWith" => ScalarOp::EndsWith,
            _ => return None,
        })
    }

    fn comparison_symbol(self) -> Option<&'static str> {
        match self {
            ScalarOp::Equals => Some("="),
            ScalarOp::Gt => Some(">"),
            ScalarOp::Gte => Some(">="),
            ScalarOp::Lt => Some("<"),
            ScalarOp::Lte => Some("<="),
            _ => None,
        }
    }
}

/// Compiles every operator key in `obj` against `field_expr` (an already
/// quoted/qualified column reference) and joins the resulting fragments
/// with `AND`. `depth` tracks nested-`not` recursion (limit
/// [`MAX_NOT_DEPTH`]).
pub fn compile_object(
    field_expr: &str,
    obj: &serde_json::Map<String, serde_json::Value>,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    depth: usize,
    path: &str,
) -> Result<String, CompileError> {
    let mut fragments = Vec::new();
    let insensitive = is_case_insensitive(obj);

    for (key, raw_value) in obj {
        if key == "mode" {
            continue;
        }
        let Some(op) = ScalarOp::parse(key) else {
            return Err(CompileError::unknown_operator(key.as_str(), path));
        };
        let fragment = compile_one(
            field_expr, op, raw_value, store, adapter, depth, path, insensitive,
        )?;
        fragments.push(fragment);
    }

    if fragments.is_empty() {
        return Ok("1=1".to_string());
    }
    Ok(fragments.join(" AND "))
}

#[allow(clippy::too_many_arguments)]
fn compile_one(
    field_expr: &str,
    op: ScalarOp,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    depth: usize,
    path: &str,
    insensitive: bool,
) -> Result<String, CompileError> {
    match op {
        ScalarOp::Not => compile_not(field_expr, raw_value, store, adapter, depth, path, insensitive),
        ScalarOp::In => compile_in(field_expr, raw_value, store, adapter, path, false),
        ScalarOp::NotIn => compile_in(field_expr, raw_value, store, adapter, path, true),
        ScalarOp::Contains => compile_like(field_expr, raw_value, store, adapter, path, "%{}%", insensitive),
        ScalarOp::StartsWith => compile_like(field_expr, raw_value, store, adapter, path, "{}%", insensitive),
        ScalarOp::EndsWith => compile_like(field_expr, raw_value, store, adapter, path, "%{}", insensitive),
        ScalarOp::Equals | ScalarOp::Gt | ScalarOp::Gte | ScalarOp::Lt | ScalarOp::Lte => {
            compile_comparison(field_expr, op, raw_value, store, adapter, path, insensitive)
        }
    }
}

fn compile_comparison(
    field_expr: &str,
    op: ScalarOp,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    path: &str,
    insensitive: bool,
) -> Result<String, CompileError> {
    if raw_value.is_null() {
        return match op {
            ScalarOp::Equals => Ok(format!("{field_expr} IS NULL")),
            _ => Err(CompileError::invalid_operator_for_type(
                format!("{op:?}"),
                field_expr,
                path,
            )),
        };
    }
    let value = value::coerce(raw_value)?;
    let placeholder = store.add_auto(adapter, value)?;
    if op == ScalarOp::Equals && insensitive {
        return Ok(adapter.case_insensitive_equals(field_expr, &placeholder));
    }
    let symbol = op
        .comparison_symbol()
        .expect("comparison operators always have a symbol");
    Ok(format!("{field_expr} {symbol} {placeholder}"))
}

fn compile_in(
    field_expr: &str,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    path: &str,
    negated: bool,
) -> Result<String, CompileError> {
    let serde_json::Value::Array(items) = raw_value else {
        return Err(CompileError::invalid_argument(
            "in/notIn expects a list value",
            path,
        ));
    };
    if items.is_empty() {
        return Ok(if negated { "1=1".to_string() } else { "0=1".to_string() });
    }
    let value = value::coerce(raw_value)?;
    let placeholder = store.add_auto(adapter, value)?;
    Ok(if negated {
        adapter.not_in_array(field_expr, &placeholder)
    } else {
        adapter.in_array(field_expr, &placeholder)
    })
}

fn compile_like(
    field_expr: &str,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    path: &str,
    wildcard_template: &str,
    insensitive: bool,
) -> Result<String, CompileError> {
    let serde_json::Value::String(text) = raw_value else {
        return Err(CompileError::invalid_argument(
            "contains/startsWith/endsWith expects a string value",
            path,
        ));
    };
    // Only the wildcard literals are inlined into the template; the user
    // value itself always goes through the parameter store.
    let wildcarded = wildcard_template.replace("{}", text);
    let placeholder = store.add_static(adapter, Value::Text(CompactString::from(wildcarded)))?;
    Ok(if insensitive {
        adapter.case_insensitive_like(field_expr, &placeholder)
    } else {
        format!("{field_expr} LIKE {placeholder}")
    })
}

#[allow(clippy::too_many_arguments)]
fn compile_not(
    field_expr: &str,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    depth: usize,
    path: &str,
    insensitive: bool,
) -> Result<String, CompileError> {
    if depth >= MAX_NOT_DEPTH {
        return Err(CompileError::depth_exceeded(MAX_NOT_DEPTH, path));
    }
    match raw_value {
        serde_json::Value::Null => Ok(format!("{field_expr} IS NOT NULL")),
        serde_json::Value::Object(nested) => {
            let inner = compile_object(field_expr, nested, store, adapter, depth + 1, path)?;
            Ok(format!("NOT ({inner})"))
        }
        primitive => {
            let value = value::coerce(primitive)?;
            let placeholder = store.add_auto(adapter, value)?;
            if insensitive {
                Ok(format!(
                    "NOT ({})",
                    adapter.case_insensitive_equals(field_expr, &placeholder)
                ))
            } else {
                Ok(format!("{field_expr} <> {placeholder}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::test_support::TestAdapter;

    fn obj(json: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match json {
            serde_json::Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn equals_null_becomes_is_null() {
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let sql = compile_object(
            "\"u\".\"email\"",
            &obj(serde_json::json!({"equals": null})),
            &mut store,
            &adapter,
            0,
            "",
        )
        .unwrap();
        assert_eq!(sql, "\"u\".\"email\" IS NULL");
    }

    #[test]
    fn gt_on_null_is_invalid_operator() {
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let err = compile_object(
            "\"u\".\"age\"",
            &obj(serde_json::json!({"gt": null})),
            &mut store,
            &adapter,
            0,
            "",
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidOperatorForType);
    }

    #[test]
    fn empty_in_is_always_false() {
        let adapter = TestAdapter(Dialect::SQLite);
        let mut store = ParamStore::new();
        let sql = compile_object(
            "\"t\".\"id\"",
            &obj(serde_json::json!({"in": []})),
            &mut store,
            &adapter,
            0,
            "",
        )
        .unwrap();
        assert_eq!(sql, "0=1");
        assert!(store.is_empty());
    }

    #[test]
    fn empty_not_in_is_always_true() {
        let adapter = TestAdapter(Dialect::SQLite);
        let mut store = ParamStore::new();
        let sql = compile_object(
            "\"t\".\"id\"",
            &obj(serde_json::json!({"notIn": []})),
            &mut store,
            &adapter,
            0,
            "",
        )
        .unwrap();
        assert_eq!(sql, "1=1");
    }

    #[test]
    fn contains_only_inlines_wildcards() {
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let sql = compile_object(
            "\"u\".\"email\"",
            &obj(serde_json::json!({"contains": "x"})),
            &mut store,
            &adapter,
            0,
            "",
        )
        .unwrap();
        assert_eq!(sql, "\"u\".\"email\" LIKE $1");
        let snap = store.snapshot();
        match &snap.bindings[0] {
            crate::params::Binding::Static { value, .. } => {
                assert_eq!(value.as_text(), Some("%x%"));
            }
            _ => panic!("expected static binding"),
        }
    }

    #[test]
    fn not_object_wraps_in_not_parens() {
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let sql = compile_object(
            "\"u\".\"age\"",
            &obj(serde_json::json!({"not": {"gt": 5}})),
            &mut store,
            &adapter,
            0,
            "",
        )
        .unwrap();
        assert_eq!(sql, "NOT (\"u\".\"age\" > $1)");
    }

    #[test]
    fn not_depth_exceeded() {
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        // Build a nested `not` chain deeper than the limit.
        let mut value = serde_json::json!({"equals": 1});
        for _ in 0..(MAX_NOT_DEPTH + 1) {
            value = serde_json::json!({"not": value});
        }
        let err = compile_object("\"u\".\"age\"", &obj(value), &mut store, &adapter, 0, "").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::DepthExceeded);
    }

    #[test]
    fn unknown_operator_errors() {
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let err = compile_object(
            "\"u\".\"age\"",
            &obj(serde_json::json!({"bogus": 1})),
            &mut store,
            &adapter,
            0,
            "",
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UnknownOperator);
    }
}
