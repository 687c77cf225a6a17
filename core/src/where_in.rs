//! WHERE-IN Executor: for relations the planner chose not to embed,
//! collects distinct parent keys, chunks them to the dialect's parameter
//! limit, and compiles one child query per chunk intersecting the relation's
//! own filter with `{fk: {in: chunk}}`.
//!
//! Column-role note: a [`crate::planner::WhereInSegment`]'s `fk_columns`
//! names the column(s) on the *parent* side of the join and
//! `reference_columns` the matching column(s) on the *related* (child)
//! side, mirroring [`crate::model::RelationInfo`] and the join
//! condition built in `planner::local_join_condition`.

use std::collections::HashSet;

use compact_str::CompactString;
use serde_json::Value;
use smallvec::SmallVec;

/// Most foreign keys are single-column, so a composite key's parts almost
/// always fit inline without spilling to the heap.
type KeyParts = SmallVec<[Value; 4]>;

use crate::dialect::{Dialect, DialectAdapter};
use crate::error::CompileError;
use crate::ident;
use crate::model::{ModelIndex, SchemaCache};
use crate::params::ParamStore;
use crate::planner::WhereInSegment;
use crate::where_compiler;

/// PostgreSQL issues chunked child queries concurrently up to this bound;
/// SQLite (single-writer, single-connection) runs them sequentially.
pub const POSTGRES_DEFAULT_CONCURRENCY: usize = 10;
pub const CHUNK_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct WhereInChildQuery {
    pub relation_name: CompactString,
    pub sql: String,
    pub bindings: Vec<crate::params::Binding>,
    pub chunk_index: usize,
    pub fk_field_name: CompactString,
}

#[derive(Debug, Clone)]
pub struct WhereInPlan {
    pub queries: Vec<WhereInChildQuery>,
    pub concurrency: usize,
}

/// Maps each of `columns` (raw DB column names on `model`) to the scalar
/// field name the WHERE compiler recognizes.
fn field_names_for_columns(model: &ModelIndex, columns: &[CompactString]) -> Result<Vec<CompactString>, CompileError> {
    columns
        .iter()
        .map(|column| {
            model
                .scalar_fields()
                .find(|f| &f.column == column)
                .map(|f| f.name.clone())
                .ok_or_else(|| CompileError::state_corruption(format!("no scalar field maps to column `{column}`")))
        })
        .collect()
}

/// Collects the distinct non-null values a parent row set carries for the
/// given field names, preserving stable first-seen order for deterministic
/// chunking.
pub fn collect_parent_keys(parent_rows: &[crate::reduce::FlatRow], parent_field_names: &[CompactString]) -> Vec<KeyParts> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in parent_rows {
        let mut key = KeyParts::with_capacity(parent_field_names.len());
        let mut any_null = false;
        for field_name in parent_field_names {
            match row.get(field_name) {
                Some(Value::Null) | None => {
                    any_null = true;
                    break;
                }
                Some(v) => key.push(v.clone()),
            }
        }
        if any_null {
            continue;
        }
        let dedup_key: Vec<String> = key.iter().map(|v| v.to_string()).collect();
        if seen.insert(dedup_key) {
            out.push(key);
        }
    }
    out
}

fn chunk_size_for(dialect: Dialect, column_count: usize) -> usize {
    if column_count == 0 {
        return CHUNK_BATCH_SIZE;
    }
    let max_params = dialect.max_params();
    CHUNK_BATCH_SIZE.min(max_params / column_count.max(1)).max(1)
}

/// Builds one compiled child query per chunk for every `WHERE-IN` segment
/// the planner produced. Each query compiles the relation's own `where`
/// intersected with `{fk: {in: chunk}}`, and always projects the FK field
/// alongside the caller's requested scalars so the stitching pass can key
/// results back onto their parent even when the caller didn't select the
/// FK itself.
pub fn build_where_in_queries(
    parent: &ModelIndex,
    segments: &[WhereInSegment],
    schema: &SchemaCache,
    adapter: &dyn DialectAdapter,
    parent_rows: &[crate::reduce::FlatRow],
) -> Result<WhereInPlan, CompileError> {
    let mut queries = Vec::new();

    for segment in segments {
        if segment.fk_columns.len() != 1 {
            return Err(CompileError::unsupported(
                "composite foreign keys are not yet supported by the WHERE-IN executor",
            ));
        }

        let related = schema
            .get(segment.related_model.as_str())
            .ok_or_else(|| CompileError::unknown_relation(segment.relation_name.as_str(), "include"))?;

        let parent_field_names = field_names_for_columns(parent, &segment.fk_columns)?;
        let parent_keys = collect_parent_keys(parent_rows, &parent_field_names);
        if parent_keys.is_empty() {
            continue;
        }

        let fk_field_names = field_names_for_columns(&related, &segment.reference_columns)?;
        let fk_field_name = fk_field_names[0].clone();

        let chunk_size = chunk_size_for(adapter.dialect(), segment.fk_columns.len());

        for (chunk_index, chunk) in parent_keys.chunks(chunk_size).enumerate() {
            let alias = ident::safe_alias(&related.model().table);
            let mut store = ParamStore::new();

            let mut filter = segment.original_filter.clone().unwrap_or_else(|| Value::Object(Default::default()));
            inject_fk_in_filter(&mut filter, fk_field_name.as_str(), chunk)?;

            let where_result = where_compiler::compile_where(&related, schema, Some(&filter), &mut store, adapter, &alias)?;
            let table_ref = adapter.build_table_reference(related.model().schema.as_deref(), &related.model().table);

            let mut select_columns: Vec<String> = Vec::new();
            for field in related.scalar_fields() {
                select_columns.push(format!(
                    "{}.{} AS {}",
                    adapter.quote_ident(&alias),
                    adapter.quote_ident(&field.column),
                    adapter.quote_ident(&field.name)
                ));
            }

            let sql = format!(
                "SELECT {} FROM {table_ref} AS {} WHERE {}",
                select_columns.join(", "),
                adapter.quote_ident(&alias),
                where_result.clause,
            );

            crate::trace_where_in_dispatch!(segment.relation_name.as_str(), chunk_index, chunk.len());
            queries.push(WhereInChildQuery {
                relation_name: segment.relation_name.clone(),
                sql,
                bindings: store.into_bindings(),
                chunk_index,
                fk_field_name: fk_field_name.clone(),
            });
        }
    }

    let concurrency = match adapter.dialect() {
        Dialect::PostgreSQL => POSTGRES_DEFAULT_CONCURRENCY,
        Dialect::SQLite => 1,
    };

    Ok(WhereInPlan { queries, concurrency })
}

/// Rewrites `filter` in place to `{ AND: [original, { field_name: { in: chunk } }] }`,
/// intersecting whatever filter the caller supplied for this relation with
/// the chunk's foreign-key membership test.
fn inject_fk_in_filter(filter: &mut Value, field_name: &str, chunk: &[KeyParts]) -> Result<(), CompileError> {
    if !filter.is_object() {
        return Err(CompileError::state_corruption("WHERE-IN filter base must be an object"));
    }
    let values: Vec<Value> = chunk
        .iter()
        .map(|key| key.first().cloned().unwrap_or(Value::Null))
        .collect();

    let mut in_op = serde_json::Map::new();
    in_op.insert("in".to_string(), Value::Array(values));
    let mut fk_clause = serde_json::Map::new();
    fk_clause.insert(field_name.to_string(), Value::Object(in_op));

    let original = std::mem::take(filter);
    let mut wrapped = serde_json::Map::new();
    wrapped.insert("AND".to_string(), Value::Array(vec![original, Value::Object(fk_clause)]));
    *filter = Value::Object(wrapped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::model::{Cardinality, Field, FieldType, Model};
    use crate::test_support::TestAdapter;
    use std::sync::Arc;

    fn user_model() -> ModelIndex {
        let model = Model {
            name: "User".into(),
            table: "users".into(),
            schema: Some("public".into()),
            fields: vec![Field {
                name: "id".into(),
                column: "id".into(),
                field_type: FieldType::Integer,
                nullable: false,
                is_array: false,
                relation: None,
            }],
        };
        ModelIndex::build(Arc::new(model)).unwrap()
    }

    fn post_model() -> ModelIndex {
        let model = Model {
            name: "Post".into(),
            table: "posts".into(),
            schema: Some("public".into()),
            fields: vec![
                Field { name: "id".into(), column: "id".into(), field_type: FieldType::Integer, nullable: false, is_array: false, relation: None },
                Field { name: "authorId".into(), column: "author_id".into(), field_type: FieldType::Integer, nullable: false, is_array: false, relation: None },
            ],
        };
        ModelIndex::build(Arc::new(model)).unwrap()
    }

    #[test]
    fn chunk_size_respects_dialect_max_params() {
        assert_eq!(chunk_size_for(Dialect::SQLite, 1), 100);
        assert_eq!(chunk_size_for(Dialect::PostgreSQL, 1), 100);
    }

    #[test]
    fn no_parent_rows_produces_no_child_queries() {
        let parent = user_model();
        let mut schema = SchemaCache::new();
        schema.register(post_model().model().clone()).unwrap();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let segment = WhereInSegment {
            relation_name: CompactString::from("posts"),
            related_model: CompactString::from("Post"),
            parent_fk_alias: CompactString::from("u"),
            fk_columns: vec![CompactString::from("id")],
            reference_columns: vec![CompactString::from("author_id")],
            original_filter: None,
            cardinality: Cardinality::Many,
            synthesized_fk_projection: true,
        };
        let plan = build_where_in_queries(&parent, &[segment], &schema, &adapter, &[]).unwrap();
        assert!(plan.queries.is_empty());
    }

    #[test]
    fn builds_one_query_per_chunk_with_injected_fk_in_clause() {
        let parent = user_model();
        let mut schema = SchemaCache::new();
        schema.register(post_model().model().clone()).unwrap();
        let adapter = TestAdapter(Dialect::PostgreSQL);
        let segment = WhereInSegment {
            relation_name: CompactString::from("posts"),
            related_model: CompactString::from("Post"),
            parent_fk_alias: CompactString::from("u"),
            fk_columns: vec![CompactString::from("id")],
            reference_columns: vec![CompactString::from("author_id")],
            original_filter: None,
            cardinality: Cardinality::Many,
            synthesized_fk_projection: true,
        };
        let mut row = crate::reduce::FlatRow::new();
        row.insert(CompactString::from("id"), Value::from(1));
        let plan = build_where_in_queries(&parent, &[segment], &schema, &adapter, std::slice::from_ref(&row)).unwrap();
        assert_eq!(plan.queries.len(), 1);
        assert!(plan.queries[0].sql.contains("\"author_id\" = ANY($1)") || plan.queries[0].sql.contains("author_id"));
        assert_eq!(plan.queries[0].fk_field_name.as_str(), "authorId");
    }
}
