//! Aggregate / Group / Count Builders: `_count`/`_sum`/`_avg`/`_min`/
//! `_max` projections, `groupBy` with `GROUP BY` + `HAVING`, and the
//! `count`-method skip restriction.

use compact_str::CompactString;

use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::model::ModelIndex;
use crate::operators::scalar;
use crate::params::ParamStore;
use crate::request::{IntArg, Method, QueryRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    fn sql_name(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }

    fn key(self) -> &'static str {
        match self {
            AggregateFn::Count => "_count",
            AggregateFn::Sum => "_sum",
            AggregateFn::Avg => "_avg",
            AggregateFn::Min => "_min",
            AggregateFn::Max => "_max",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "_count" => AggregateFn::Count,
            "_sum" => AggregateFn::Sum,
            "_avg" => AggregateFn::Avg,
            "_min" => AggregateFn::Min,
            "_max" => AggregateFn::Max,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AggregateProjection {
    pub alias: CompactString,
    pub expr: String,
}

fn field_expr(adapter: &dyn DialectAdapter, alias: &str, column: &str) -> String {
    format!("{}.{}", adapter.quote_ident(alias), adapter.quote_ident(column))
}

/// `count` (and `_count` within `aggregate`/`groupBy`) forbids a statically
/// positive `skip`, since a row count over an offset window isn't the
/// aggregate result callers expect. A dynamic `skip` is rejected outright,
/// since its sign can't be checked at build time and a deterministic
/// tie-breaker would be required to make it meaningful anyway.
pub fn validate_count_pagination(method: Method, pagination: &crate::request::Pagination) -> Result<(), CompileError> {
    if method != Method::Count {
        return Ok(());
    }
    match &pagination.skip {
        Some(IntArg::Static(skip)) if *skip > 0 => Err(CompileError::invalid_argument(
            "count does not accept a positive static skip",
            "skip",
        )),
        Some(IntArg::Dynamic(_)) => Err(CompileError::invalid_argument(
            "count does not accept a dynamic skip",
            "skip",
        )),
        _ => Ok(()),
    }
}

/// Renders every requested `_count`/`_sum`/`_avg`/`_min`/`_max` selector into
/// a flat, order-stable list of aliased aggregate expressions.
pub fn build_aggregate_projections(
    model: &ModelIndex,
    adapter: &dyn DialectAdapter,
    alias: &str,
    request: &QueryRequest,
) -> Result<Vec<AggregateProjection>, CompileError> {
    let mut out = Vec::new();
    for (func, selector) in [
        (AggregateFn::Count, &request.count),
        (AggregateFn::Sum, &request.sum),
        (AggregateFn::Avg, &request.avg),
        (AggregateFn::Min, &request.min),
        (AggregateFn::Max, &request.max),
    ] {
        if let Some(selector) = selector {
            render_selector(model, adapter, alias, func, selector, &mut out)?;
        }
    }
    Ok(out)
}

fn render_selector(
    model: &ModelIndex,
    adapter: &dyn DialectAdapter,
    alias: &str,
    func: AggregateFn,
    selector: &serde_json::Value,
    out: &mut Vec<AggregateProjection>,
) -> Result<(), CompileError> {
    match selector {
        serde_json::Value::Bool(true) if func == AggregateFn::Count => {
            out.push(AggregateProjection {
                alias: CompactString::from(func.key()),
                expr: "COUNT(*)".to_string(),
            });
            Ok(())
        }
        serde_json::Value::Object(obj) => {
            for (field_name, flag) in obj {
                if !matches!(flag, serde_json::Value::Bool(true)) {
                    continue;
                }
                let expr = if func == AggregateFn::Count && field_name == "_all" {
                    "COUNT(*)".to_string()
                } else {
                    let field = model
                        .get_field_by_name(field_name)
                        .ok_or_else(|| CompileError::unknown_field(field_name.as_str(), func.key()))?;
                    if field.is_relation() {
                        return Err(CompileError::invalid_argument(
                            format!("`{}` cannot target relation field `{field_name}`", func.key()),
                            func.key(),
                        ));
                    }
                    if func != AggregateFn::Count && !field.is_numeric() {
                        return Err(CompileError::invalid_operator_for_type(func.key(), field_name.as_str(), func.key()));
                    }
                    format!("{}({})", func.sql_name(), field_expr(adapter, alias, &field.column))
                };
                out.push(AggregateProjection {
                    alias: CompactString::from(format!("{}.{field_name}", func.key())),
                    expr,
                });
            }
            Ok(())
        }
        _ => Err(CompileError::invalid_argument(
            format!("`{}` must be `true` or an object of field flags", func.key()),
            func.key(),
        )),
    }
}

#[derive(Debug, Clone)]
pub struct GroupByOutcome {
    pub select_columns: Vec<String>,
    pub group_by_clause: String,
    pub having_clause: Option<String>,
}

/// Builds the `SELECT`/`GROUP BY`/`HAVING` pieces for a `groupBy` query
/// query. Pagination and ordering over the grouped rows are applied
/// by the caller exactly as for `findMany`.
pub fn build_group_by(
    model: &ModelIndex,
    adapter: &dyn DialectAdapter,
    alias: &str,
    request: &QueryRequest,
    store: &mut ParamStore,
) -> Result<GroupByOutcome, CompileError> {
    if request.by.is_empty() {
        return Err(CompileError::invalid_argument("groupBy requires a non-empty `by` list", "by"));
    }

    let mut select_columns = Vec::new();
    let mut group_by_parts = Vec::new();
    for field_name in &request.by {
        let field = model
            .get_field_by_name(field_name.as_str())
            .ok_or_else(|| CompileError::unknown_field(field_name.as_str(), "by"))?;
        if field.is_relation() {
            return Err(CompileError::invalid_argument(format!("`by` field `{field_name}` must be scalar"), "by"));
        }
        let expr = field_expr(adapter, alias, &field.column);
        select_columns.push(format!("{expr} AS {}", adapter.quote_ident(field_name.as_str())));
        group_by_parts.push(expr);
    }

    for projection in build_aggregate_projections(model, adapter, alias, request)? {
        select_columns.push(format!("{} AS {}", projection.expr, adapter.quote_ident(projection.alias.as_str())));
    }

    let having_clause = match &request.having {
        Some(having) => Some(compile_having(model, adapter, alias, having, store, "having")?),
        None => None,
    };

    Ok(GroupByOutcome {
        select_columns,
        group_by_clause: group_by_parts.join(", "),
        having_clause,
    })
}

/// Recursive descent over a `having` tree, mirroring the WHERE compiler's
/// shape but resolving each leaf against either a bare grouped field or an
/// aggregate expression, in either the aggregate-first
/// (`{_sum: {amount: {gt: 10}}}`) or field-first
/// (`{amount: {_avg: {gte: 1}}}`) shape.
fn compile_having(
    model: &ModelIndex,
    adapter: &dyn DialectAdapter,
    alias: &str,
    node: &serde_json::Value,
    store: &mut ParamStore,
    path: &str,
) -> Result<String, CompileError> {
    let serde_json::Value::Object(obj) = node else {
        return Err(CompileError::invalid_argument("having node must be an object", path));
    };

    let mut fragments = Vec::new();
    for (key, value) in obj {
        let child_path = format!("{path}.{key}");
        let fragment = match key.as_str() {
            "AND" | "OR" | "NOT" => compile_having_logical(model, adapter, alias, value, store, &child_path, key)?,
            _ => match AggregateFn::from_key(key) {
                Some(func) => compile_aggregate_first(model, adapter, alias, func, value, store, &child_path)?,
                None => compile_field_first(model, adapter, alias, key, value, store, &child_path)?,
            },
        };
        fragments.push(fragment);
    }

    if fragments.is_empty() {
        return Ok("1=1".to_string());
    }
    Ok(fragments.join(" AND "))
}

fn compile_having_logical(
    model: &ModelIndex,
    adapter: &dyn DialectAdapter,
    alias: &str,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    path: &str,
    connective: &str,
) -> Result<String, CompileError> {
    let children: Vec<&serde_json::Value> = match raw_value {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(_) => vec![raw_value],
        _ => return Err(CompileError::invalid_argument(format!("{connective} expects an object or list"), path)),
    };
    if children.is_empty() {
        return Ok(match connective {
            "OR" => "0=1".to_string(),
            _ => "1=1".to_string(),
        });
    }
    let mut compiled = Vec::with_capacity(children.len());
    for (i, child) in children.iter().enumerate() {
        let child_path = format!("{path}[{i}]");
        compiled.push(compile_having(model, adapter, alias, child, store, &child_path)?);
    }
    Ok(match connective {
        "AND" => format!("({})", compiled.join(" AND ")),
        "OR" => format!("({})", compiled.join(" OR ")),
        "NOT" => format!("NOT ({})", compiled.join(" AND ")),
        _ => unreachable!(),
    })
}

fn compile_aggregate_first(
    model: &ModelIndex,
    adapter: &dyn DialectAdapter,
    alias: &str,
    func: AggregateFn,
    value: &serde_json::Value,
    store: &mut ParamStore,
    path: &str,
) -> Result<String, CompileError> {
    let serde_json::Value::Object(fields) = value else {
        return Err(CompileError::invalid_argument(format!("{} in having must be an object", func.key()), path));
    };
    let mut fragments = Vec::new();
    for (field_name, operator_obj) in fields {
        let expr = if func == AggregateFn::Count && field_name == "_all" {
            "COUNT(*)".to_string()
        } else {
            let field = model
                .get_field_by_name(field_name)
                .ok_or_else(|| CompileError::unknown_field(field_name.as_str(), path))?;
            if func != AggregateFn::Count && !field.is_numeric() {
                return Err(CompileError::invalid_operator_for_type(func.key(), field_name.as_str(), path));
            }
            format!("{}({})", func.sql_name(), field_expr(adapter, alias, &field.column))
        };
        let serde_json::Value::Object(op_obj) = operator_obj else {
            return Err(CompileError::invalid_argument("having leaf must be an operator object", path));
        };
        fragments.push(scalar::compile_object(&expr, op_obj, store, adapter, 0, path)?);
    }
    if fragments.is_empty() {
        return Ok("1=1".to_string());
    }
    Ok(fragments.join(" AND "))
}

fn compile_field_first(
    model: &ModelIndex,
    adapter: &dyn DialectAdapter,
    alias: &str,
    field_name: &str,
    value: &serde_json::Value,
    store: &mut ParamStore,
    path: &str,
) -> Result<String, CompileError> {
    let field = model
        .get_field_by_name(field_name)
        .ok_or_else(|| CompileError::unknown_field(field_name, path))?;
    if field.is_relation() {
        return Err(CompileError::invalid_argument(format!("`{field_name}` is a relation, not a groupable field"), path));
    }
    let col_expr = field_expr(adapter, alias, &field.column);

    match value {
        serde_json::Value::Object(obj) if obj.len() == 1 => {
            let (key, inner) = obj.iter().next().expect("len checked above");
            if let Some(func) = AggregateFn::from_key(key) {
                let agg_expr = format!("{}({col_expr})", func.sql_name());
                let serde_json::Value::Object(op_obj) = inner else {
                    return Err(CompileError::invalid_argument("having leaf must be an operator object", path));
                };
                return scalar::compile_object(&agg_expr, op_obj, store, adapter, 0, path);
            }
            scalar::compile_object(&col_expr, obj, store, adapter, 0, path)
        }
        serde_json::Value::Object(obj) => scalar::compile_object(&col_expr, obj, store, adapter, 0, path),
        primitive => {
            let coerced = crate::value::coerce(primitive)?;
            let placeholder = store.add_auto(adapter, coerced)?;
            Ok(format!("{col_expr} = {placeholder}"))
        }
    }
}
