//! SQLite implementation for qcompiler
//!
//! Provides the [`SqliteDialect`] [`DialectAdapter`] implementation: bare
//! `?` placeholders, `json_each`-based array membership, `json_extract` for
//! JSON paths, and table references with no schema qualifier.

use std::borrow::Cow;

use compact_str::CompactString;
use qcompiler_core::dialect::{Dialect, DialectAdapter};
use qcompiler_core::Value;

/// Dialect adapter for SQLite (`rusqlite`/`libsql`/`turso` driver glue is
/// left to the caller; this crate only emits SQL text, per the governing
/// non-goals around concrete driver adapters).
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl DialectAdapter for SqliteDialect {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    fn placeholder_for(&self, _position: usize) -> Cow<'static, str> {
        Cow::Borrowed("?")
    }

    fn in_array(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} IN (SELECT value FROM json_each({placeholder}))")
    }

    fn not_in_array(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} NOT IN (SELECT value FROM json_each({placeholder}))")
    }

    fn array_contains(&self, expr: &str, placeholder: &str) -> String {
        format!("NOT EXISTS (SELECT 1 FROM json_each({placeholder}) WHERE value NOT IN (SELECT value FROM json_each({expr})))")
    }

    fn array_overlaps(&self, expr: &str, placeholder: &str) -> String {
        format!("EXISTS (SELECT 1 FROM json_each({placeholder}) WHERE value IN (SELECT value FROM json_each({expr})))")
    }

    fn array_contains_all(&self, expr: &str, placeholder: &str) -> String {
        format!("NOT EXISTS (SELECT 1 FROM json_each({placeholder}) WHERE value NOT IN (SELECT value FROM json_each({expr})))")
    }

    fn array_is_empty(&self, expr: &str) -> String {
        format!("(SELECT COUNT(*) FROM json_each({expr})) = 0")
    }

    fn array_is_not_empty(&self, expr: &str) -> String {
        format!("(SELECT COUNT(*) FROM json_each({expr})) > 0")
    }

    fn array_equals(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} = {placeholder}")
    }

    fn json_extract_text(&self, expr: &str, path_placeholder: &str) -> String {
        format!("json_extract({expr}, {path_placeholder})")
    }

    fn json_extract_numeric(&self, expr: &str, path_placeholder: &str) -> String {
        // json_extract already returns SQLite's own numeric affinity for a
        // JSON number; no cast needed (unlike PostgreSQL's #>> which always
        // yields text).
        format!("json_extract({expr}, {path_placeholder})")
    }

    fn json_to_text(&self, json_extract_text_expr: &str) -> String {
        json_extract_text_expr.to_string()
    }

    fn encode_json_path(&self, segments: &[CompactString]) -> Value {
        let mut path = String::from("$");
        for segment in segments {
            path.push('.');
            path.push_str(segment.as_str());
        }
        Value::Text(CompactString::from(path))
    }

    fn case_insensitive_like(&self, expr: &str, placeholder: &str) -> String {
        // SQLite's LIKE is already case-insensitive for ASCII by default.
        format!("{expr} LIKE {placeholder}")
    }

    fn case_insensitive_equals(&self, expr: &str, placeholder: &str) -> String {
        format!("LOWER({expr}) = LOWER({placeholder})")
    }

    fn build_table_reference(&self, _schema: Option<&str>, table: &str) -> String {
        self.quote_ident(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_bare_question_mark() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.placeholder_for(1), "?");
        assert_eq!(dialect.placeholder_for(9), "?");
    }

    #[test]
    fn table_reference_ignores_schema() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.build_table_reference(Some("public"), "users"), "\"users\"");
        assert_eq!(dialect.build_table_reference(None, "users"), "\"users\"");
    }

    #[test]
    fn in_array_uses_json_each() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.in_array("\"status\"", "?1"), "\"status\" IN (SELECT value FROM json_each(?1))");
    }

    #[test]
    fn json_extract_numeric_has_no_cast() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.json_extract_numeric("\"data\"", "?1"), "json_extract(\"data\", ?1)");
    }

    #[test]
    fn encode_json_path_builds_dotted_path() {
        let dialect = SqliteDialect;
        let path = dialect.encode_json_path(&[CompactString::from("a"), CompactString::from("b")]);
        assert_eq!(path.as_text(), Some("$.a.b"));
    }
}
