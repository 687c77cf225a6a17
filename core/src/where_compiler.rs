//! WHERE Compiler: recursive descent over the filter tree with depth
//! and cycle guards, dispatching logical connectives, relation filters, and
//! scalar fields, plus relation-filter semantics.

use compact_str::CompactString;

use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::ident;
use crate::model::{Cardinality, ModelIndex, SchemaCache};
use crate::operators::{array, json, scalar};
use crate::params::ParamStore;

/// WHERE depth limit.
pub const MAX_WHERE_DEPTH: usize = 50;

/// Result of compiling a filter subtree. `joins` is reserved for
/// relation-filter strategies that need a helper JOIN alongside an EXISTS
/// body; the implementation here always resolves relation filters to
/// EXISTS/NOT EXISTS, so it is always empty — kept on the struct so
/// callers that compose WHERE fragments (the planner and the aggregate
/// builder) have a stable shape to
/// merge into their own join list.
#[derive(Debug, Clone, Default)]
pub struct WhereClauseResult {
    pub clause: String,
    pub joins: Vec<String>,
}

struct Ctx<'a> {
    schema: &'a SchemaCache,
    adapter: &'a dyn DialectAdapter,
    visited: Vec<*const serde_json::Value>,
}

/// Compiles `filter` (the `where` argument) against `model` into a single
/// clause. An absent/empty filter compiles to the constant `1=1`.
pub fn compile_where(
    model: &ModelIndex,
    schema: &SchemaCache,
    filter: Option<&serde_json::Value>,
    store: &mut ParamStore,
    adapter: &dyn DialectAdapter,
    alias: &str,
) -> Result<WhereClauseResult, CompileError> {
    let mut ctx = Ctx {
        schema,
        adapter,
        visited: Vec::new(),
    };
    let clause = match filter {
        None => "1=1".to_string(),
        Some(value) => compile_node(&mut ctx, model, value, store, alias, 0, false, "where")?,
    };
    crate::trace_where_compiled!(model.model().name.as_str(), &clause, store.len());
    Ok(WhereClauseResult { clause, joins: Vec::new() })
}

#[allow(clippy::too_many_arguments)]
fn compile_node(
    ctx: &mut Ctx<'_>,
    model: &ModelIndex,
    node: &serde_json::Value,
    store: &mut ParamStore,
    alias: &str,
    depth: usize,
    is_subquery: bool,
    path: &str,
) -> Result<String, CompileError> {
    if depth > MAX_WHERE_DEPTH {
        return Err(CompileError::depth_exceeded(MAX_WHERE_DEPTH, path));
    }
    let ptr = node as *const serde_json::Value;
    if ctx.visited.contains(&ptr) {
        return Err(CompileError::cycle_detected(path));
    }
    ctx.visited.push(ptr);
    let result = compile_node_inner(ctx, model, node, store, alias, depth, is_subquery, path);
    ctx.visited.pop();
    result
}

#[allow(clippy::too_many_arguments)]
fn compile_node_inner(
    ctx: &mut Ctx<'_>,
    model: &ModelIndex,
    node: &serde_json::Value,
    store: &mut ParamStore,
    alias: &str,
    depth: usize,
    is_subquery: bool,
    path: &str,
) -> Result<String, CompileError> {
    let serde_json::Value::Object(obj) = node else {
        return Err(CompileError::invalid_argument("filter node must be an object", path));
    };

    let mut fragments = Vec::new();
    for (key, raw_value) in obj {
        let child_path = format!("{path}.{key}");
        let fragment = match key.as_str() {
            "AND" => compile_logical(ctx, model, raw_value, store, alias, depth, is_subquery, &child_path, "AND")?,
            "OR" => compile_logical(ctx, model, raw_value, store, alias, depth, is_subquery, &child_path, "OR")?,
            "NOT" => compile_logical(ctx, model, raw_value, store, alias, depth, is_subquery, &child_path, "NOT")?,
            field_name => compile_field(
                ctx, model, field_name, raw_value, store, alias, depth, &child_path,
            )?,
        };
        fragments.push(fragment);
    }

    if fragments.is_empty() {
        return Ok("1=1".to_string());
    }
    Ok(fragments.join(" AND "))
}

#[allow(clippy::too_many_arguments)]
fn compile_logical(
    ctx: &mut Ctx<'_>,
    model: &ModelIndex,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    alias: &str,
    depth: usize,
    is_subquery: bool,
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
        compiled.push(compile_node(ctx, model, child, store, alias, depth + 1, is_subquery, &child_path)?);
    }

    Ok(match connective {
        "AND" => format!("({})", compiled.join(" AND ")),
        "OR" => format!("({})", compiled.join(" OR ")),
        "NOT" => format!("NOT ({})", compiled.join(" AND ")),
        _ => unreachable!(),
    })
}

#[allow(clippy::too_many_arguments)]
fn compile_field(
    ctx: &mut Ctx<'_>,
    model: &ModelIndex,
    field_name: &str,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    alias: &str,
    depth: usize,
    path: &str,
) -> Result<String, CompileError> {
    let Some(field) = model.get_field_by_name(field_name) else {
        return Err(CompileError::unknown_field(field_name, path));
    };

    if field.is_relation() {
        return compile_relation_filter(ctx, model, field_name, raw_value, store, alias, depth, path);
    }

    let column = ctx.adapter.quote_ident(&field.column);
    let field_expr = format!("{}.{column}", ctx.adapter.quote_ident(alias));

    if raw_value.is_null() {
        return Ok(format!("{field_expr} IS NULL"));
    }

    match raw_value {
        serde_json::Value::Object(obj) if field.is_json() => {
            json::compile_path_object(&field_expr, obj, store, ctx.adapter, path)
        }
        serde_json::Value::Object(obj) if field.is_array => {
            array::compile_object(&field_expr, obj, store, ctx.adapter, path)
        }
        serde_json::Value::Object(obj) => {
            scalar::compile_object(&field_expr, obj, store, ctx.adapter, 0, path)
        }
        primitive => {
            let value = crate::value::coerce(primitive)?;
            let placeholder = store.add_auto(ctx.adapter, value)?;
            Ok(format!("{field_expr} = {placeholder}"))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn compile_relation_filter(
    ctx: &mut Ctx<'_>,
    model: &ModelIndex,
    field_name: &str,
    raw_value: &serde_json::Value,
    store: &mut ParamStore,
    alias: &str,
    depth: usize,
    path: &str,
) -> Result<String, CompileError> {
    let field = model.get_field_by_name(field_name).expect("checked by caller");
    let relation = field.relation.as_ref().expect("checked by caller");
    let related = ctx
        .schema
        .get(relation.related_model.as_str())
        .ok_or_else(|| CompileError::unknown_relation(field_name, path))?;

    let serde_json::Value::Object(obj) = raw_value else {
        return Err(CompileError::invalid_argument("relation filter must be an object", path));
    };

    let sub_alias = ident::relation_alias(alias, field_name, depth);
    let on_condition = join_condition(ctx, model, &related, relation, alias, &sub_alias);
    let table_ref = ctx.adapter.build_table_reference(
        related.model().schema.as_deref(),
        &related.model().table,
    );

    let mut keys: Vec<&str> = obj.keys().map(|k| k.as_str()).collect();
    keys.sort();

    let mut fragments = Vec::new();
    for key in keys {
        let sub_filter = &obj[key];
        let child_path = format!("{path}.{key}");
        let compiled_sub = compile_node(ctx, &related, sub_filter, store, &sub_alias, depth + 1, true, &child_path)?;
        let exists_body = format!(
            "SELECT 1 FROM {table_ref} AS {quoted_sub} WHERE {on_condition} AND {compiled_sub}",
            quoted_sub = ctx.adapter.quote_ident(&sub_alias)
        );
        let not_exists_body = format!(
            "SELECT 1 FROM {table_ref} AS {quoted_sub} WHERE {on_condition} AND NOT ({compiled_sub})",
            quoted_sub = ctx.adapter.quote_ident(&sub_alias)
        );
        let fragment = match key {
            "some" | "is" => format!("EXISTS ({exists_body})"),
            "none" | "isNot" => format!("NOT EXISTS ({exists_body})"),
            "every" => format!("NOT EXISTS ({not_exists_body})"),
            other => {
                return Err(CompileError::invalid_argument(
                    format!("unknown relation filter key `{other}`"),
                    &child_path,
                ));
            }
        };
        fragments.push(fragment);
    }

    let _ = relation.cardinality;
    if fragments.is_empty() {
        return Ok("1=1".to_string());
    }
    Ok(fragments.join(" AND "))
}

fn join_condition(
    ctx: &Ctx<'_>,
    parent: &ModelIndex,
    _related: &ModelIndex,
    relation: &crate::model::RelationInfo,
    parent_alias: &str,
    child_alias: &str,
) -> String {
    let (local_cols, remote_cols): (&[CompactString], &[CompactString]) = match relation.cardinality {
        Cardinality::One | Cardinality::Many => (&relation.fk_columns, &relation.reference_columns),
    };
    let _ = parent;
    let mut parts = Vec::with_capacity(local_cols.len());
    for (local, remote) in local_cols.iter().zip(remote_cols.iter()) {
        parts.push(format!(
            "{}.{} = {}.{}",
            ctx.adapter.quote_ident(parent_alias),
            ctx.adapter.quote_ident(local),
            ctx.adapter.quote_ident(child_alias),
            ctx.adapter.quote_ident(remote),
        ));
    }
    parts.join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::model::{Field, FieldType, Model};
    use crate::test_support::TestAdapter;

    fn user_model() -> ModelIndex {
        let model = Model {
            name: "User".into(),
            table: "users".into(),
            schema: Some("public".into()),
            fields: vec![
                Field {
                    name: "id".into(),
                    column: "id".into(),
                    field_type: FieldType::Integer,
                    nullable: false,
                    is_array: false,
                    relation: None,
                },
                Field {
                    name: "email".into(),
                    column: "email".into(),
                    field_type: FieldType::String,
                    nullable: false,
                    is_array: false,
                    relation: None,
                },
            ],
        };
        ModelIndex::build(std::sync::Arc::new(model)).unwrap()
    }

    #[test]
    fn s1_simple_equality() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let result = compile_where(
            &model,
            &schema,
            Some(&serde_json::json!({"email": "a@b"})),
            &mut store,
            &adapter,
            "u",
        )
        .unwrap();
        assert_eq!(result.clause, "\"u\".\"email\" = $1");
    }

    #[test]
    fn empty_where_is_1eq1() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let result = compile_where(&model, &schema, None, &mut store, &adapter, "u").unwrap();
        assert_eq!(result.clause, "1=1");
        assert!(store.is_empty());
    }

    #[test]
    fn and_of_single_matches_plain_compile() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);

        let mut store_a = ParamStore::new();
        let plain = compile_where(
            &model,
            &schema,
            Some(&serde_json::json!({"email": {"equals": "x"}})),
            &mut store_a,
            &adapter,
            "u",
        )
        .unwrap();

        let mut store_b = ParamStore::new();
        let anded = compile_where(
            &model,
            &schema,
            Some(&serde_json::json!({"AND": [{"email": {"equals": "x"}}]})),
            &mut store_b,
            &adapter,
            "u",
        )
        .unwrap();

        assert_eq!(anded.clause, format!("({})", plain.clause));
        assert_eq!(store_a.snapshot().bindings, store_b.snapshot().bindings);
    }

    #[test]
    fn unknown_field_errors() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let err = compile_where(
            &model,
            &schema,
            Some(&serde_json::json!({"bogus": 1})),
            &mut store,
            &adapter,
            "u",
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UnknownField);
    }

    #[test]
    fn empty_or_is_0eq1() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let result = compile_where(&model, &schema, Some(&serde_json::json!({"OR": []})), &mut store, &adapter, "u").unwrap();
        assert_eq!(result.clause, "0=1");
    }

    #[test]
    fn depth_limit_enforced() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let mut store = ParamStore::new();
        let mut value = serde_json::json!({"email": "x"});
        for _ in 0..(MAX_WHERE_DEPTH + 2) {
            value = serde_json::json!({"AND": [value]});
        }
        let err = compile_where(&model, &schema, Some(&value), &mut store, &adapter, "u").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::DepthExceeded);
    }
}
