//! Property-based tests covering placeholder density, string escaping,
//! `{AND:[W]}` equivalence, determinism, the parameter store's
//! `addDynamic` idempotence, and batch reindexing's concatenation
//! property.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use qcompiler_core::batch::{fuse_counts, CountQuery};
use qcompiler_core::model::{Field, FieldType, Model, ModelIndex, SchemaCache};
use qcompiler_core::{compile, Binding, Method, PlannerThresholds, RelationStats};
use qcompiler_postgres::PostgresDialect;
use qcompiler_sqlite::SqliteDialect;

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
    ModelIndex::build(Arc::new(model)).unwrap()
}

/// Extracts every `$N`/`?` placeholder position actually present in `sql`,
/// for the PostgreSQL-numbered case (SQLite's bare `?` carries no position
/// to recover, so that dialect is exercised by the density check directly
/// on the binding vector instead).
fn placeholder_positions_in_sql(sql: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end > start {
                positions.push(sql[start..end].parse().unwrap());
            }
            i = end;
        } else {
            i += 1;
        }
    }
    positions
}

proptest! {
    // Invariant 1: the multiset of placeholder positions in `sql` is
    // exactly `{1..N}`, no gaps, no duplicates.
    #[test]
    fn placeholder_positions_are_dense_from_one(email in "[a-z]{1,8}", extra in prop::collection::vec(1i64..1000, 0..4)) {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = PostgresDialect;
        let stats = RelationStats::new();
        let thresholds = PlannerThresholds::default();

        let compiled = compile(
            &model,
            &schema,
            &adapter,
            Method::FindMany,
            &serde_json::json!({
                "where": { "OR": [ { "email": email }, { "id": { "in": extra } } ] }
            }),
            &stats,
            &thresholds,
        )
        .unwrap();

        let mut positions = placeholder_positions_in_sql(&compiled.sql);
        positions.sort_unstable();
        positions.dedup();
        let expected: Vec<usize> = (1..=compiled.bindings.len()).collect();
        prop_assert_eq!(positions, expected);

        let mut binding_positions: Vec<usize> = compiled.bindings.iter().map(Binding::position).collect();
        binding_positions.sort_unstable();
        prop_assert_eq!(binding_positions, (1..=compiled.bindings.len()).collect::<Vec<_>>());
    }

    // Invariant 2: a user-provided string never appears verbatim in `sql`
    // outside of a bound placeholder; it is always routed through the
    // parameter store, never interpolated into the text.
    #[test]
    fn user_strings_never_leak_into_sql_text(needle in "[a-zA-Z]{4,12}") {
        // Guard against the (vanishingly rare) generated string coinciding
        // with a keyword or identifier fragment the compiler itself emits.
        prop_assume!(!["SELECT", "FROM", "WHERE", "users", "email", "AND", "OR"]
            .iter()
            .any(|kw| kw.eq_ignore_ascii_case(&needle)));

        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = PostgresDialect;
        let stats = RelationStats::new();
        let thresholds = PlannerThresholds::default();

        let compiled = compile(
            &model,
            &schema,
            &adapter,
            Method::FindMany,
            &serde_json::json!({ "where": { "email": needle } }),
            &stats,
            &thresholds,
        )
        .unwrap();

        prop_assert!(!compiled.sql.contains(needle.as_str()));
    }

    // Invariant 3: `{AND:[W]}` compiles to the same clause as `W` (modulo
    // the extra parenthesization a logical wrapper always adds) with
    // identical parameter order.
    #[test]
    fn and_of_single_subtree_matches_bare_subtree(email in "[a-z]{1,8}") {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = PostgresDialect;
        let stats = RelationStats::new();
        let thresholds = PlannerThresholds::default();

        let bare = compile(
            &model,
            &schema,
            &adapter,
            Method::FindMany,
            &serde_json::json!({ "where": { "email": email } }),
            &stats,
            &thresholds,
        )
        .unwrap();

        let wrapped = compile(
            &model,
            &schema,
            &adapter,
            Method::FindMany,
            &serde_json::json!({ "where": { "AND": [ { "email": email } ] } }),
            &stats,
            &thresholds,
        )
        .unwrap();

        // The WHERE clause bodies agree up to the wrapper's own parens.
        let bare_clause = &bare.sql[bare.sql.find("WHERE").unwrap() + "WHERE ".len()..];
        let wrapped_clause = &wrapped.sql[wrapped.sql.find("WHERE").unwrap() + "WHERE ".len()..];
        prop_assert_eq!(format!("({bare_clause})"), wrapped_clause.to_string());
        prop_assert_eq!(bare.bindings.len(), wrapped.bindings.len());
    }

    // Invariant 4: compilation is deterministic for equal inputs.
    #[test]
    fn compilation_is_deterministic(email in "[a-z]{1,8}", id in 1i64..1000) {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = PostgresDialect;
        let stats = RelationStats::new();
        let thresholds = PlannerThresholds::default();
        let request = serde_json::json!({ "where": { "OR": [ { "email": email }, { "id": id } ] } });

        let first = compile(&model, &schema, &adapter, Method::FindMany, &request, &stats, &thresholds).unwrap();
        let second = compile(&model, &schema, &adapter, Method::FindMany, &request, &stats, &thresholds).unwrap();

        prop_assert_eq!(first.sql, second.sql);
        prop_assert_eq!(format!("{:?}", first.bindings), format!("{:?}", second.bindings));
    }
}

// Invariant 6: `addDynamic` called twice with the same name in one
// compilation returns the same placeholder token (tested directly against
// `ParamStore` since the public `compile` entrypoint never surfaces
// dynamic markers on its own — they originate from a `$dynamic` value
// coercion, exercised here at the store level instead).
#[test]
fn add_dynamic_is_idempotent_within_one_store() {
    use qcompiler_core::ParamStore;

    let adapter = PostgresDialect;
    let mut store = ParamStore::new();
    let first = store.add_dynamic(&adapter, "userId").unwrap();
    let second = store.add_dynamic(&adapter, "userId").unwrap();
    assert_eq!(first, second);
    assert_eq!(store.into_bindings().len(), 1);
}

#[test]
fn add_dynamic_is_idempotent_sqlite() {
    use qcompiler_core::ParamStore;

    let adapter = SqliteDialect;
    let mut store = ParamStore::new();
    let first = store.add_dynamic(&adapter, "userId").unwrap();
    let second = store.add_dynamic(&adapter, "userId").unwrap();
    assert_eq!(first, second);
    assert_eq!(first, "?");
}

proptest! {
    // Invariant 7: batch reindexing's parameter vector is the concatenation
    // of each sub-query's own vector (each count query here has exactly
    // one static binding, so the fused vector's length is the sum).
    #[test]
    fn batch_reindexing_concatenates_sub_bindings(emails in prop::collection::vec("[a-z]{1,6}", 1..5)) {
        let model = user_model();
        let schema = SchemaCache::new();
        let adapter = PostgresDialect;
        let stats = RelationStats::new();
        let thresholds = PlannerThresholds::default();

        let mut queries = Vec::new();
        let mut expected_total = 0usize;
        for (i, email) in emails.iter().enumerate() {
            let compiled = compile(
                &model,
                &schema,
                &adapter,
                Method::Count,
                &serde_json::json!({ "where": { "email": email } }),
                &stats,
                &thresholds,
            )
            .unwrap();
            expected_total += compiled.bindings.len();
            queries.push(CountQuery {
                alias: format!("q{i}").into(),
                sql: compiled.sql,
                bindings: compiled.bindings,
            });
        }

        let fused = fuse_counts(&adapter, queries).unwrap();
        prop_assert_eq!(fused.bindings.len(), expected_total);
        prop_assert_eq!(fused.count_aliases.len(), emails.len());
    }
}

// Invariant 5 (round-trip): reducing a set of flat rows against a
// relation-less include plan recovers exactly the distinct parent primary
// keys present, each carrying its own scalar projection unchanged.
#[test]
fn reduce_round_trip_recovers_distinct_parent_keys() {
    use qcompiler_core::reduce::{reduce_rows, FlatRow};
    use qcompiler_core::IncludePlan;
    use qcompiler_core::planner::ScalarColumnSpec;

    let plan = IncludePlan {
        parent_model: "User".into(),
        parent_pk_aliases: vec!["id".into()],
        scalars: vec![ScalarColumnSpec {
            alias: "email".into(),
            expr: "\"users\".\"email\"".to_string(),
            is_json: false,
        }],
        relations: Vec::new(),
    };

    let mut rows: Vec<FlatRow> = Vec::new();
    for (id, email) in [(1, "a@b"), (1, "a@b"), (2, "c@d"), (3, "e@f")] {
        let mut row: FlatRow = HashMap::new();
        row.insert("id".into(), serde_json::json!(id));
        row.insert("email".into(), serde_json::json!(email));
        rows.push(row);
    }

    let reduced = reduce_rows(&plan, &rows).unwrap();
    assert_eq!(reduced.len(), 3);
    assert_eq!(reduced[0]["email"], serde_json::json!("a@b"));
    assert_eq!(reduced[1]["email"], serde_json::json!("c@d"));
    assert_eq!(reduced[2]["email"], serde_json::json!("e@f"));
}
