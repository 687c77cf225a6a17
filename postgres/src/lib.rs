//! PostgreSQL implementation for qcompiler
//!
//! Provides the [`PostgresDialect`] [`DialectAdapter`] implementation:
//! numbered `$N` placeholders, native array operators (`= ANY`, `@>`,
//! `&&`), `jsonb` path extraction, and schema-qualified table references.

use std::borrow::Cow;

use compact_str::CompactString;
use qcompiler_core::dialect::{Dialect, DialectAdapter};
use qcompiler_core::Value;

/// Dialect adapter for PostgreSQL (`tokio-postgres`/`postgres`/AWS Data API
/// driver glue is left to the caller; this crate only emits SQL text, per
/// the governing non-goals around concrete driver adapters).
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl DialectAdapter for PostgresDialect {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSQL
    }

    fn placeholder_for(&self, position: usize) -> Cow<'static, str> {
        Cow::Owned(format!("${position}"))
    }

    fn in_array(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} = ANY({placeholder})")
    }

    fn not_in_array(&self, expr: &str, placeholder: &str) -> String {
        format!("NOT ({expr} = ANY({placeholder}))")
    }

    fn array_contains(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} @> {placeholder}")
    }

    fn array_overlaps(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} && {placeholder}")
    }

    fn array_contains_all(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} @> {placeholder}")
    }

    fn array_is_empty(&self, expr: &str) -> String {
        format!("{expr} = '{{}}'")
    }

    fn array_is_not_empty(&self, expr: &str) -> String {
        format!("{expr} <> '{{}}'")
    }

    fn array_equals(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} = {placeholder}")
    }

    fn json_extract_text(&self, expr: &str, path_placeholder: &str) -> String {
        format!("{expr} #>> {path_placeholder}")
    }

    fn json_extract_numeric(&self, expr: &str, path_placeholder: &str) -> String {
        format!("({})::numeric", self.json_extract_text(expr, path_placeholder))
    }

    fn json_to_text(&self, json_extract_text_expr: &str) -> String {
        json_extract_text_expr.to_string()
    }

    fn encode_json_path(&self, segments: &[CompactString]) -> Value {
        Value::List(segments.iter().map(|s| Value::Text(s.clone())).collect())
    }

    fn case_insensitive_like(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} ILIKE {placeholder}")
    }

    fn case_insensitive_equals(&self, expr: &str, placeholder: &str) -> String {
        format!("LOWER({expr}) = LOWER({placeholder})")
    }

    fn build_table_reference(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(table)),
            None => self.quote_ident(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_numbered() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.placeholder_for(1), "$1");
        assert_eq!(dialect.placeholder_for(12), "$12");
    }

    #[test]
    fn table_reference_qualifies_schema() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.build_table_reference(Some("public"), "users"), "\"public\".\"users\"");
        assert_eq!(dialect.build_table_reference(None, "users"), "\"users\"");
    }

    #[test]
    fn in_array_uses_equals_any() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.in_array("\"status\"", "$1"), "\"status\" = ANY($1)");
    }

    #[test]
    fn json_extract_numeric_casts_to_numeric() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.json_extract_numeric("\"data\"", "$1"), "(\"data\" #>> $1)::numeric");
    }

    #[test]
    fn encode_json_path_builds_text_array() {
        let dialect = PostgresDialect;
        let path = dialect.encode_json_path(&[CompactString::from("a"), CompactString::from("b")]);
        assert_eq!(path.as_list().unwrap().len(), 2);
    }
}
