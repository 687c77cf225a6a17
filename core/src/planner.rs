//! SELECT / Include Planner: chooses JOIN-embed vs. WHERE-IN per
//! relation using cardinality stats, and assembles the main SELECT with
//! joins, ordering, pagination, and distinct.

use std::collections::HashSet;

use compact_str::CompactString;

use crate::dialect::DialectAdapter;
use crate::error::CompileError;
use crate::ident;
use crate::model::{Cardinality, ModelIndex, SchemaCache};
use crate::params::ParamStore;
use crate::request::{IntArg, Method, OrderKey, Pagination, SortDirection};
use crate::stats::RelationStats;
use crate::where_compiler;

/// Tunable constants governing the embed-vs-WHERE-IN decision, pinned here
/// as an explicit, documented default rather than left as an implicit
/// literal.
#[derive(Debug, Clone, Copy)]
pub struct PlannerThresholds {
    /// `coverage * avg` below this is cheap enough to embed.
    pub embed_expected_children_max: f64,
    /// `p99` above this is too risky to embed regardless of the average.
    pub embed_p99_max: f64,
}

impl Default for PlannerThresholds {
    fn default() -> Self {
        Self {
            embed_expected_children_max: 5.0,
            embed_p99_max: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationStrategy {
    Embed,
    WhereIn,
}

#[derive(Debug, Clone)]
pub struct ScalarColumnSpec {
    pub alias: CompactString,
    pub expr: String,
    pub is_json: bool,
}

#[derive(Debug, Clone)]
pub struct RelationPlan {
    pub name: CompactString,
    pub cardinality: Cardinality,
    pub related_model: CompactString,
    pub pk_projections: Vec<ScalarColumnSpec>,
    pub scalars: Vec<ScalarColumnSpec>,
    pub nested: Option<Box<IncludePlan>>,
    pub strategy: RelationStrategy,
    pub fk_columns: Vec<CompactString>,
    pub reference_columns: Vec<CompactString>,
}

/// Immutable description of which related records to materialize and how
/// to stitch them.
#[derive(Debug, Clone)]
pub struct IncludePlan {
    pub parent_model: CompactString,
    pub parent_pk_aliases: Vec<CompactString>,
    pub scalars: Vec<ScalarColumnSpec>,
    pub relations: Vec<RelationPlan>,
}

pub const MAX_INCLUDE_DEPTH: usize = 10;

#[derive(Debug, Clone)]
pub struct WhereInSegment {
    pub relation_name: CompactString,
    pub related_model: CompactString,
    pub parent_fk_alias: CompactString,
    pub fk_columns: Vec<CompactString>,
    pub reference_columns: Vec<CompactString>,
    pub original_filter: Option<serde_json::Value>,
    pub cardinality: Cardinality,
    pub synthesized_fk_projection: bool,
}

#[derive(Debug, Clone)]
pub struct SelectOutcome {
    pub sql: String,
    pub requires_reduction: bool,
    pub include_plan: Option<IncludePlan>,
    pub where_in_segments: Vec<WhereInSegment>,
}

/// Extracts the set of requested relation names + nested shape from
/// `select`/`include`. Relation keys in `include` must be in the model's
/// relation set but unknown keys there are silently ignored; unknown keys
/// in `select` are errors.
struct ShapeRequest<'a> {
    scalar_filter: Option<HashSet<&'a str>>,
    relations: Vec<(&'a str, &'a serde_json::Value)>,
}

fn parse_shape<'a>(
    model: &ModelIndex,
    select: Option<&'a serde_json::Value>,
    include: Option<&'a serde_json::Value>,
) -> Result<ShapeRequest<'a>, CompileError> {
    if let Some(serde_json::Value::Object(obj)) = select {
        let mut scalar_filter = HashSet::new();
        let mut relations = Vec::new();
        for (key, value) in obj {
            if model.is_relation(key) {
                relations.push((key.as_str(), value));
            } else if model.has_scalar(key) {
                if matches!(value, serde_json::Value::Bool(true)) {
                    scalar_filter.insert(key.as_str());
                }
            } else {
                return Err(CompileError::unknown_field(key.as_str(), "select"));
            }
        }
        return Ok(ShapeRequest {
            scalar_filter: Some(scalar_filter),
            relations,
        });
    }

    let mut relations = Vec::new();
    if let Some(serde_json::Value::Object(obj)) = include {
        for (key, value) in obj {
            if model.is_relation(key) {
                relations.push((key.as_str(), value));
            }
            // Unknown keys in `include` are silently ignored.
        }
    }
    Ok(ShapeRequest {
        scalar_filter: None,
        relations,
    })
}

fn decide_strategy(
    stats: &RelationStats,
    parent_model: &str,
    relation_name: &str,
    cardinality: Cardinality,
    thresholds: &PlannerThresholds,
) -> RelationStrategy {
    let strategy = if cardinality == Cardinality::One {
        RelationStrategy::Embed
    } else {
        match stats.get(parent_model, relation_name) {
            Some(stat) => {
                let expected = stat.coverage * stat.avg;
                if expected <= thresholds.embed_expected_children_max && stat.p99 <= thresholds.embed_p99_max {
                    RelationStrategy::Embed
                } else {
                    RelationStrategy::WhereIn
                }
            }
            None => RelationStrategy::WhereIn,
        }
    };
    crate::trace_relation_strategy!(parent_model, relation_name, strategy);
    strategy
}

#[allow(clippy::too_many_arguments)]
fn build_include_plan(
    model: &ModelIndex,
    schema: &SchemaCache,
    select: Option<&serde_json::Value>,
    include: Option<&serde_json::Value>,
    alias: &str,
    stats: &RelationStats,
    thresholds: &PlannerThresholds,
    depth: usize,
    adapter: &dyn DialectAdapter,
    joins: &mut Vec<String>,
    seen_joins: &mut HashSet<String>,
    where_in_segments: &mut Vec<WhereInSegment>,
) -> Result<(Vec<ScalarColumnSpec>, Vec<RelationPlan>, bool), CompileError> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(CompileError::depth_exceeded(MAX_INCLUDE_DEPTH, "include"));
    }

    let shape = parse_shape(model, select, include)?;

    let mut scalars = Vec::new();
    for field in model.scalar_fields() {
        let include_it = match &shape.scalar_filter {
            Some(filter) => filter.contains(field.name.as_str()),
            None => true,
        };
        if include_it {
            let relation_prefix = if depth == 0 { String::new() } else { format!("{alias}.") };
            scalars.push(ScalarColumnSpec {
                alias: CompactString::from(format!("{relation_prefix}{}", field.name)),
                expr: format!("{}.{}", adapter.quote_ident(alias), adapter.quote_ident(&field.column)),
                is_json: field.is_json(),
            });
        }
    }

    let mut requires_reduction = false;
    let mut relations = Vec::new();
    for (relation_name, nested_value) in shape.relations {
        let field = model.get_field_by_name(relation_name).expect("validated by parse_shape");
        let relation_info = field.relation.as_ref().expect("relation field has relation info");
        let related = schema
            .get(relation_info.related_model.as_str())
            .ok_or_else(|| CompileError::unknown_relation(relation_name, "include"))?;

        let strategy = decide_strategy(stats, model.model().name.as_str(), relation_name, relation_info.cardinality, thresholds);
        let sub_alias = ident::relation_alias(alias, relation_name, depth);

        let (nested_select, nested_include) = match nested_value {
            serde_json::Value::Object(obj) => (obj.get("select"), obj.get("include")),
            _ => (None, None),
        };

        let pk_fields = related.primary_key_fields();
        let pk_projections: Vec<ScalarColumnSpec> = pk_fields
            .iter()
            .map(|f| ScalarColumnSpec {
                alias: CompactString::from(format!("{sub_alias}.{}", f.name)),
                expr: format!("{}.{}", adapter.quote_ident(&sub_alias), adapter.quote_ident(&f.column)),
                is_json: false,
            })
            .collect();

        match strategy {
            RelationStrategy::Embed => {
                requires_reduction = true;
                let join_cond = local_join_condition(adapter, relation_info, alias, &sub_alias);
                let table_ref = adapter.build_table_reference(related.model().schema.as_deref(), &related.model().table);
                let join_sql = format!(
                    "LEFT JOIN {table_ref} AS {} ON {join_cond}",
                    adapter.quote_ident(&sub_alias)
                );
                if seen_joins.insert(join_sql.clone()) {
                    joins.push(join_sql);
                }

                let (nested_scalars, nested_relations, nested_requires) = build_include_plan(
                    &related,
                    schema,
                    nested_select,
                    nested_include,
                    &sub_alias,
                    stats,
                    thresholds,
                    depth + 1,
                    adapter,
                    joins,
                    seen_joins,
                    where_in_segments,
                )?;
                requires_reduction = requires_reduction || nested_requires;

                relations.push(RelationPlan {
                    name: CompactString::from(relation_name),
                    cardinality: relation_info.cardinality,
                    related_model: relation_info.related_model.clone(),
                    pk_projections,
                    scalars: nested_scalars,
                    nested: Some(Box::new(IncludePlan {
                        parent_model: relation_info.related_model.clone(),
                        parent_pk_aliases: pk_fields.iter().map(|f| f.name.clone()).collect(),
                        scalars: Vec::new(),
                        relations: nested_relations,
                    })),
                    strategy,
                    fk_columns: relation_info.fk_columns.clone(),
                    reference_columns: relation_info.reference_columns.clone(),
                });
            }
            RelationStrategy::WhereIn => {
                let original_filter = match nested_value {
                    serde_json::Value::Object(obj) => obj.get("where").cloned(),
                    _ => None,
                };
                where_in_segments.push(WhereInSegment {
                    relation_name: CompactString::from(relation_name),
                    related_model: relation_info.related_model.clone(),
                    parent_fk_alias: CompactString::from(alias),
                    fk_columns: relation_info.fk_columns.clone(),
                    reference_columns: relation_info.reference_columns.clone(),
                    original_filter,
                    cardinality: relation_info.cardinality,
                    synthesized_fk_projection: true,
                });
                relations.push(RelationPlan {
                    name: CompactString::from(relation_name),
                    cardinality: relation_info.cardinality,
                    related_model: relation_info.related_model.clone(),
                    pk_projections,
                    scalars: Vec::new(),
                    nested: None,
                    strategy,
                    fk_columns: relation_info.fk_columns.clone(),
                    reference_columns: relation_info.reference_columns.clone(),
                });
            }
        }
    }

    Ok((scalars, relations, requires_reduction))
}

fn local_join_condition(
    adapter: &dyn DialectAdapter,
    relation: &crate::model::RelationInfo,
    parent_alias: &str,
    child_alias: &str,
) -> String {
    relation
        .fk_columns
        .iter()
        .zip(relation.reference_columns.iter())
        .map(|(fk, reference)| {
            format!(
                "{}.{} = {}.{}",
                adapter.quote_ident(parent_alias),
                adapter.quote_ident(fk),
                adapter.quote_ident(child_alias),
                adapter.quote_ident(reference),
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn render_order_by(
    adapter: &dyn DialectAdapter,
    model: &ModelIndex,
    alias: &str,
    order_by: &[OrderKey],
) -> Result<String, CompileError> {
    let mut parts = Vec::new();
    let mut has_id = false;
    for key in order_by {
        if !model.has_scalar(key.field.as_str()) {
            return Err(CompileError::unknown_field(key.field.as_str(), "orderBy"));
        }
        if key.field.as_str() == "id" {
            has_id = true;
        }
        let field = model.get_field_by_name(&key.field).expect("checked above");
        let dir = match key.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let mut fragment = format!(
            "{}.{} {dir}",
            adapter.quote_ident(alias),
            adapter.quote_ident(&field.column)
        );
        if let Some(nulls) = key.nulls {
            fragment.push_str(match nulls {
                crate::request::NullsOrder::First => " NULLS FIRST",
                crate::request::NullsOrder::Last => " NULLS LAST",
            });
        }
        parts.push(fragment);
    }
    // Mandatory deterministic tie-breaker: pagination over an
    // embedded-join result set is only well-defined with a total order.
    if !has_id && model.has_scalar("id") {
        parts.push(format!("{}.{} ASC", adapter.quote_ident(alias), adapter.quote_ident("id")));
    }
    Ok(parts.join(", "))
}

fn render_pagination(
    adapter: &dyn DialectAdapter,
    store: &mut ParamStore,
    pagination: &Pagination,
) -> Result<(Option<String>, Option<String>), CompileError> {
    let take = match &pagination.take {
        Some(IntArg::Static(n)) => Some(n.to_string()),
        Some(IntArg::Dynamic(name)) => Some(store.add_dynamic(adapter, name.clone())?),
        None => None,
    };
    let skip = match &pagination.skip {
        Some(IntArg::Static(n)) => Some(n.to_string()),
        Some(IntArg::Dynamic(name)) => Some(store.add_dynamic(adapter, name.clone())?),
        None => None,
    };
    Ok((take, skip))
}

/// Builds a keyset (`cursor`) predicate from the caller's anchor values.
///
/// `cursor`'s keys must form a contiguous leading prefix of `order_by` — the
/// coverage requirement that makes the anchor unambiguous — and the
/// resulting clause is the standard seek-method disjunction:
/// `(k0 >/< a0) OR (k0 = a0 AND k1 >/< a1) OR ...`, with each comparison
/// direction matching its key's sort direction.
fn render_cursor_predicate(
    adapter: &dyn DialectAdapter,
    model: &ModelIndex,
    alias: &str,
    order_by: &[OrderKey],
    cursor: &serde_json::Value,
    store: &mut ParamStore,
) -> Result<String, CompileError> {
    let serde_json::Value::Object(obj) = cursor else {
        return Err(CompileError::invalid_argument("cursor must be an object of field anchors", "cursor"));
    };
    if obj.is_empty() {
        return Err(CompileError::invalid_argument("cursor must supply at least one anchor field", "cursor"));
    }
    if order_by.is_empty() {
        return Err(CompileError::invalid_argument(
            "cursor requires a non-empty orderBy covering its anchor fields",
            "cursor",
        ));
    }

    let mut prefix_len = 0;
    while prefix_len < order_by.len() && obj.contains_key(order_by[prefix_len].field.as_str()) {
        prefix_len += 1;
    }
    if prefix_len == 0 || obj.len() != prefix_len {
        return Err(CompileError::invalid_argument(
            "cursor fields must be a contiguous leading prefix of orderBy",
            "cursor",
        ));
    }

    let mut anchors: Vec<(String, String, SortDirection)> = Vec::with_capacity(prefix_len);
    for key in &order_by[..prefix_len] {
        let field = model.get_field_by_name(key.field.as_str()).expect("covered by orderBy, validated by render_order_by");
        let raw = &obj[key.field.as_str()];
        let expr = format!("{}.{}", adapter.quote_ident(alias), adapter.quote_ident(&field.column));
        let placeholder = store.add_auto(adapter, crate::value::coerce(raw)?)?;
        anchors.push((expr, placeholder, key.direction));
    }

    let mut terms = Vec::with_capacity(prefix_len);
    for i in 0..prefix_len {
        let mut parts = Vec::with_capacity(i + 1);
        for (expr, placeholder, _) in &anchors[..i] {
            parts.push(format!("{expr} = {placeholder}"));
        }
        let (expr, placeholder, direction) = &anchors[i];
        let op = match direction {
            SortDirection::Asc => ">",
            SortDirection::Desc => "<",
        };
        parts.push(format!("{expr} {op} {placeholder}"));
        terms.push(format!("({})", parts.join(" AND ")));
    }

    Ok(terms.join(" OR "))
}

/// Wraps the parent selection in a PK-only subselect that `LIMIT`/`OFFSET`
/// applies to, then joins the full row and any embedded relations back onto
/// that page of parent keys. Without this, a bare `LIMIT`/`OFFSET` on the
/// already-joined statement would paginate joined rows instead of parents.
#[allow(clippy::too_many_arguments)]
fn build_windowed_embed_select(
    adapter: &dyn DialectAdapter,
    model: &ModelIndex,
    alias: &str,
    table_ref: &str,
    select_columns: &[String],
    distinct_clause: &str,
    joins: &[String],
    where_clause: &str,
    order_by_clause: &str,
    take: Option<&str>,
    skip: Option<&str>,
) -> Result<String, CompileError> {
    let pk_fields = model.primary_key_fields();
    if pk_fields.is_empty() {
        return Err(CompileError::state_corruption(
            "pagination over an embedded include requires a primary key",
        ));
    }
    let page_alias = ident::safe_alias(&format!("{alias}_page"));

    let inner_select: Vec<String> = pk_fields
        .iter()
        .map(|f| {
            format!(
                "{}.{} AS {}",
                adapter.quote_ident(alias),
                adapter.quote_ident(&f.column),
                adapter.quote_ident(&f.name)
            )
        })
        .collect();

    let mut inner_sql = format!("SELECT {} FROM {table_ref} AS {}", inner_select.join(", "), adapter.quote_ident(alias));
    inner_sql.push_str(&format!(" WHERE {where_clause}"));
    if !order_by_clause.is_empty() {
        inner_sql.push_str(&format!(" ORDER BY {order_by_clause}"));
    }
    if let Some(take) = take {
        inner_sql.push_str(&format!(" LIMIT {take}"));
    }
    if let Some(skip) = skip {
        inner_sql.push_str(&format!(" OFFSET {skip}"));
    }

    let join_cond: Vec<String> = pk_fields
        .iter()
        .map(|f| {
            format!(
                "{}.{} = {}.{}",
                adapter.quote_ident(alias),
                adapter.quote_ident(&f.column),
                adapter.quote_ident(&page_alias),
                adapter.quote_ident(&f.name),
            )
        })
        .collect();

    let mut sql = format!(
        "{distinct_clause} {} FROM ({inner_sql}) AS {} JOIN {table_ref} AS {} ON {}",
        select_columns.join(", "),
        adapter.quote_ident(&page_alias),
        adapter.quote_ident(alias),
        join_cond.join(" AND "),
    );
    for join in joins {
        sql.push(' ');
        sql.push_str(join);
    }
    if !order_by_clause.is_empty() {
        sql.push_str(&format!(" ORDER BY {order_by_clause}"));
    }
    Ok(sql)
}

/// Builds the full SELECT for `findMany`/`findFirst`/`findUnique`.
/// `findFirst` is `findMany` with `take = 1`; `findUnique` is
/// `findFirst` over a unique key — both collapse to the same SQL shape,
/// callers apply the one-row-or-null semantics when reading results.
#[allow(clippy::too_many_arguments)]
pub fn build_select(
    model: &ModelIndex,
    schema: &SchemaCache,
    adapter: &dyn DialectAdapter,
    method: Method,
    request: &crate::request::QueryRequest,
    stats: &RelationStats,
    thresholds: &PlannerThresholds,
    store: &mut ParamStore,
) -> Result<SelectOutcome, CompileError> {
    let alias = ident::safe_alias(&model.model().table);
    let mut joins = Vec::new();
    let mut seen_joins = HashSet::new();
    let mut where_in_segments = Vec::new();

    let (scalars, relations, requires_reduction) = build_include_plan(
        model,
        schema,
        request.select.as_ref(),
        request.include.as_ref(),
        &alias,
        stats,
        thresholds,
        0,
        adapter,
        &mut joins,
        &mut seen_joins,
        &mut where_in_segments,
    )?;

    let where_result = where_compiler::compile_where(model, schema, request.where_.as_ref(), store, adapter, &alias)?;

    let table_ref = adapter.build_table_reference(model.model().schema.as_deref(), &model.model().table);

    let mut select_columns: Vec<String> = Vec::new();
    collect_select_columns(adapter, &scalars, &relations, &mut select_columns);

    let distinct_clause = if request.distinct.is_empty() {
        "SELECT"
    } else {
        for field in &request.distinct {
            if !model.has_scalar(field.as_str()) {
                return Err(CompileError::unknown_field(field.as_str(), "distinct"));
            }
        }
        "SELECT DISTINCT"
    };

    let order_by_clause = render_order_by(adapter, model, &alias, &request.order_by)?;

    let mut where_clause = where_result.clause;
    if let Some(cursor) = &request.pagination.cursor {
        let cursor_predicate = render_cursor_predicate(adapter, model, &alias, &request.order_by, cursor, store)?;
        where_clause = format!("({where_clause}) AND ({cursor_predicate})");
    }

    let (take, skip) = render_pagination(adapter, store, &request.pagination)?;

    let effective_take = match method {
        Method::FindFirst | Method::FindUnique => Some(take.unwrap_or_else(|| "1".to_string())),
        _ => take,
    };

    let sql = if requires_reduction && (effective_take.is_some() || skip.is_some()) {
        build_windowed_embed_select(
            adapter,
            model,
            &alias,
            &table_ref,
            &select_columns,
            distinct_clause,
            &joins,
            &where_clause,
            &order_by_clause,
            effective_take.as_deref(),
            skip.as_deref(),
        )?
    } else {
        let mut sql = format!(
            "{distinct_clause} {} FROM {table_ref} AS {}",
            select_columns.join(", "),
            adapter.quote_ident(&alias)
        );
        for join in &joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&format!(" WHERE {where_clause}"));
        if !order_by_clause.is_empty() {
            sql.push_str(&format!(" ORDER BY {order_by_clause}"));
        }
        if let Some(take) = &effective_take {
            sql.push_str(&format!(" LIMIT {take}"));
        }
        if let Some(skip) = &skip {
            sql.push_str(&format!(" OFFSET {skip}"));
        }
        sql
    };

    let include_plan = if requires_reduction {
        Some(IncludePlan {
            parent_model: model.model().name.clone(),
            parent_pk_aliases: model.primary_key_fields().iter().map(|f| f.name.clone()).collect(),
            scalars,
            relations,
        })
    } else {
        None
    };

    Ok(SelectOutcome {
        sql,
        requires_reduction,
        include_plan,
        where_in_segments,
    })
}

fn collect_select_columns(
    adapter: &dyn DialectAdapter,
    scalars: &[ScalarColumnSpec],
    relations: &[RelationPlan],
    out: &mut Vec<String>,
) {
    for scalar in scalars {
        out.push(format!("{} AS {}", scalar.expr, adapter.quote_ident(scalar.alias.as_str())));
    }
    for relation in relations {
        if relation.strategy != RelationStrategy::Embed {
            // WHERE-IN relations are fetched by a separate statement;
            // their alias never appears in this FROM clause.
            continue;
        }
        for pk in &relation.pk_projections {
            out.push(format!("{} AS {}", pk.expr, adapter.quote_ident(pk.alias.as_str())));
        }
        if let Some(nested) = &relation.nested {
            collect_select_columns(adapter, &nested.scalars, &nested.relations, out);
        }
    }
}
