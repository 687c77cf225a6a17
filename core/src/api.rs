//! Compiler entrypoint: the single [`compile`] function a driver calls
//! with a raw JSON request, dispatching to the SELECT planner, the
//! count/aggregate/group-by builder, or a bare `COUNT(*)` depending on
//! `method`, and returning one coherent [`CompiledQuery`].

use crate::aggregate::{self, AggregateProjection};
use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::ident;
use crate::model::{ModelIndex, SchemaCache};
use crate::params::{Binding, ParamStore};
use crate::planner::{self, IncludePlan, PlannerThresholds, WhereInSegment};
use crate::request::{self, IntArg, Method, QueryRequest};
use crate::stats::RelationStats;
use crate::where_compiler;

/// The fully compiled statement plus everything a caller needs to execute it
/// and, for `findMany`/`findFirst`/`findUnique`, stitch its rows back into
/// nested objects.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<Binding>,
    /// `true` when the driver must run [`crate::reduce::reduce_rows`] (or the
    /// streaming variant) over the raw rows before returning them.
    pub requires_reduction: bool,
    pub include_plan: Option<IncludePlan>,
    /// Relations the planner chose `WHERE-IN` for; the caller compiles these
    /// with [`crate::where_in::build_where_in_queries`] once the main
    /// statement's rows are in hand.
    pub where_in_segments: Vec<WhereInSegment>,
}

/// Compiles `raw_request` against `model` for `method`. This is the
/// narrow boundary where untyped JSON becomes a [`QueryRequest`] before
/// any SQL is assembled.
pub fn compile(
    model: &ModelIndex,
    schema: &SchemaCache,
    adapter: &dyn DialectAdapter,
    method: Method,
    raw_request: &serde_json::Value,
    stats: &RelationStats,
    thresholds: &PlannerThresholds,
) -> Result<CompiledQuery, CompileError> {
    let query_request = request::parse_request(raw_request)?;
    aggregate::validate_count_pagination(method, &query_request.pagination)?;

    match method {
        Method::FindMany | Method::FindFirst | Method::FindUnique => compile_select(model, schema, adapter, method, &query_request, stats, thresholds),
        Method::Count => compile_count(model, schema, adapter, &query_request),
        Method::Aggregate => compile_aggregate(model, schema, adapter, &query_request),
        Method::GroupBy => compile_group_by(model, schema, adapter, &query_request),
    }
}

fn compile_select(
    model: &ModelIndex,
    schema: &SchemaCache,
    adapter: &dyn DialectAdapter,
    method: Method,
    request: &QueryRequest,
    stats: &RelationStats,
    thresholds: &PlannerThresholds,
) -> Result<CompiledQuery, CompileError> {
    let mut store = ParamStore::new();
    let outcome = planner::build_select(model, schema, adapter, method, request, stats, thresholds, &mut store)?;
    Ok(CompiledQuery {
        sql: outcome.sql,
        bindings: store.into_bindings(),
        requires_reduction: outcome.requires_reduction,
        include_plan: outcome.include_plan,
        where_in_segments: outcome.where_in_segments,
    })
}

fn compile_count(
    model: &ModelIndex,
    schema: &SchemaCache,
    adapter: &dyn DialectAdapter,
    request: &QueryRequest,
) -> Result<CompiledQuery, CompileError> {
    let alias = ident::safe_alias(&model.model().table);
    let mut store = ParamStore::new();
    let where_result = where_compiler::compile_where(model, schema, request.where_.as_ref(), &mut store, adapter, &alias)?;
    let table_ref = adapter.build_table_reference(model.model().schema.as_deref(), &model.model().table);
    let sql = format!(
        "SELECT COUNT(*) AS {} FROM {table_ref} AS {} WHERE {}",
        adapter.quote_ident("_count._all"),
        adapter.quote_ident(&alias),
        where_result.clause
    );
    Ok(CompiledQuery {
        sql,
        bindings: store.into_bindings(),
        requires_reduction: false,
        include_plan: None,
        where_in_segments: Vec::new(),
    })
}

fn compile_aggregate(
    model: &ModelIndex,
    schema: &SchemaCache,
    adapter: &dyn DialectAdapter,
    request: &QueryRequest,
) -> Result<CompiledQuery, CompileError> {
    let alias = ident::safe_alias(&model.model().table);
    let mut store = ParamStore::new();
    let where_result = where_compiler::compile_where(model, schema, request.where_.as_ref(), &mut store, adapter, &alias)?;
    let projections = aggregate::build_aggregate_projections(model, adapter, &alias, request)?;
    if projections.is_empty() {
        return Err(CompileError::invalid_argument(
            "aggregate requires at least one of _count/_sum/_avg/_min/_max",
            "",
        ));
    }
    let table_ref = adapter.build_table_reference(model.model().schema.as_deref(), &model.model().table);
    let select_columns = render_projection_columns(adapter, &projections);
    let sql = format!(
        "SELECT {} FROM {table_ref} AS {} WHERE {}",
        select_columns.join(", "),
        adapter.quote_ident(&alias),
        where_result.clause
    );
    Ok(CompiledQuery {
        sql,
        bindings: store.into_bindings(),
        requires_reduction: false,
        include_plan: None,
        where_in_segments: Vec::new(),
    })
}

fn render_projection_columns(adapter: &dyn DialectAdapter, projections: &[AggregateProjection]) -> Vec<String> {
    projections
        .iter()
        .map(|p| format!("{} AS {}", p.expr, adapter.quote_ident(p.alias.as_str())))
        .collect()
}

fn compile_group_by(
    model: &ModelIndex,
    schema: &SchemaCache,
    adapter: &dyn DialectAdapter,
    request: &QueryRequest,
) -> Result<CompiledQuery, CompileError> {
    let alias = ident::safe_alias(&model.model().table);
    let mut store = ParamStore::new();
    let where_result = where_compiler::compile_where(model, schema, request.where_.as_ref(), &mut store, adapter, &alias)?;
    let group_outcome = aggregate::build_group_by(model, adapter, &alias, request, &mut store)?;
    let table_ref = adapter.build_table_reference(model.model().schema.as_deref(), &model.model().table);

    let mut sql = format!(
        "SELECT {} FROM {table_ref} AS {} WHERE {}",
        group_outcome.select_columns.join(", "),
        adapter.quote_ident(&alias),
        where_result.clause
    );
    if !group_outcome.group_by_clause.is_empty() {
        sql.push_str(&format!(" GROUP BY {}", group_outcome.group_by_clause));
    }
    if let Some(having) = &group_outcome.having_clause {
        sql.push_str(&format!(" HAVING {having}"));
    }

    let order_by_clause = render_group_order_by(model, adapter, &alias, request)?;
    if !order_by_clause.is_empty() {
        sql.push_str(&format!(" ORDER BY {order_by_clause}"));
    }

    let (take, skip) = render_pagination(adapter, &mut store, request)?;
    if let Some(take) = take {
        sql.push_str(&format!(" LIMIT {take}"));
    }
    if let Some(skip) = skip {
        sql.push_str(&format!(" OFFSET {skip}"));
    }

    Ok(CompiledQuery {
        sql,
        bindings: store.into_bindings(),
        requires_reduction: false,
        include_plan: None,
        where_in_segments: Vec::new(),
    })
}

/// `groupBy`'s `orderBy` only ever refers to one of the grouped-by fields
/// (aggregate-result ordering is a documented Open Question, left
/// unsupported — see `DESIGN.md`).
fn render_group_order_by(
    model: &ModelIndex,
    adapter: &dyn DialectAdapter,
    alias: &str,
    request: &QueryRequest,
) -> Result<String, CompileError> {
    let mut parts = Vec::new();
    for key in &request.order_by {
        if !request.by.iter().any(|f| f == &key.field) {
            return Err(CompileError::invalid_argument(
                format!("groupBy orderBy field `{}` must also appear in `by`", key.field),
                "orderBy",
            ));
        }
        let field = model.get_field_by_name(key.field.as_str()).expect("validated by request.by");
        let dir = match key.direction {
            crate::request::SortDirection::Asc => "ASC",
            crate::request::SortDirection::Desc => "DESC",
        };
        parts.push(format!("{}.{} {dir}", adapter.quote_ident(alias), adapter.quote_ident(&field.column)));
    }
    Ok(parts.join(", "))
}

fn render_pagination(
    adapter: &dyn DialectAdapter,
    store: &mut ParamStore,
    request: &QueryRequest,
) -> Result<(Option<String>, Option<String>), CompileError> {
    let take = match &request.pagination.take {
        Some(IntArg::Static(n)) => Some(n.to_string()),
        Some(IntArg::Dynamic(name)) => Some(store.add_dynamic(adapter, name.clone())?),
        None => None,
    };
    let skip = match &request.pagination.skip {
        Some(IntArg::Static(n)) => Some(n.to_string()),
        Some(IntArg::Dynamic(name)) => Some(store.add_dynamic(adapter, name.clone())?),
        None => None,
    };
    Ok((take, skip))
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
                Field { name: "id".into(), column: "id".into(), field_type: FieldType::Integer, nullable: false, is_array: false, relation: None },
                Field { name: "email".into(), column: "email".into(), field_type: FieldType::String, nullable: false, is_array: false, relation: None },
            ],
        };
        ModelIndex::build(std::sync::Arc::new(model)).unwrap()
    }

    #[test]
    fn find_many_compiles_through_the_planner() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let stats = RelationStats::new();
        let thresholds = PlannerThresholds::default();
        let compiled = compile(
            &model,
            &schema,
            &adapter,
            Method::FindMany,
            &serde_json::json!({ "where": { "email": "a@b" } }),
            &stats,
            &thresholds,
        )
        .unwrap();
        assert!(compiled.sql.contains("WHERE \"users\".\"email\" = $1"));
        assert!(!compiled.requires_reduction);
    }

    #[test]
    fn count_rejects_unrecognized_option() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let stats = RelationStats::new();
        let thresholds = PlannerThresholds::default();
        let err = compile(
            &model,
            &schema,
            &adapter,
            Method::Count,
            &serde_json::json!({ "bogus": true }),
            &stats,
            &thresholds,
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidOption);
    }

    #[test]
    fn count_emits_aliased_count_star() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let stats = RelationStats::new();
        let thresholds = PlannerThresholds::default();
        let compiled = compile(&model, &schema, &adapter, Method::Count, &serde_json::json!({}), &stats, &thresholds).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT COUNT(*) AS \"_count._all\" FROM \"public\".\"users\" AS \"users\" WHERE 1=1"
        );
    }

    #[test]
    fn count_with_positive_skip_is_rejected() {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let stats = RelationStats::new();
        let thresholds = PlannerThresholds::default();
        let err = compile(
            &model,
            &schema,
            &adapter,
            Method::Count,
            &serde_json::json!({ "skip": 5 }),
            &stats,
            &thresholds,
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidArgument);
    }
}
