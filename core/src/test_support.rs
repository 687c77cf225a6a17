//! Minimal dialect adapters used only by this crate's own unit tests.
//! The real adapters live in `qcompiler-sqlite`/`qcompiler-postgres`, which
//! depend on this crate and so cannot be used here without a cycle.

#![cfg(test)]

use std::borrow::Cow;

use compact_str::CompactString;

use crate::dialect::{Dialect, DialectAdapter};
use crate::value::Value;

pub struct TestAdapter(pub Dialect);

impl DialectAdapter for TestAdapter {
    fn dialect(&self) -> Dialect {
        self.0
    }

    fn placeholder_for(&self, position: usize) -> Cow<'static, str> {
        match self.0 {
            Dialect::PostgreSQL => Cow::Owned(format!("${position}")),
            Dialect::SQLite => Cow::Borrowed("?"),
        }
    }

    fn in_array(&self, expr: &str, placeholder: &str) -> String {
        match self.0 {
            Dialect::PostgreSQL => format!("{expr} = ANY({placeholder})"),
            Dialect::SQLite => format!("{expr} IN (SELECT value FROM json_each({placeholder}))"),
        }
    }

    fn not_in_array(&self, expr: &str, placeholder: &str) -> String {
        match self.0 {
            Dialect::PostgreSQL => format!("NOT ({expr} = ANY({placeholder}))"),
            Dialect::SQLite => format!("{expr} NOT IN (SELECT value FROM json_each({placeholder}))"),
        }
    }

    fn array_contains(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} @> {placeholder}")
    }

    fn array_overlaps(&self, expr: &str, placeholder: &str) -> String {
        match self.0 {
            Dialect::PostgreSQL => format!("{expr} && {placeholder}"),
            Dialect::SQLite => {
                format!("EXISTS (SELECT 1 FROM json_each({placeholder}) WHERE value IN (SELECT value FROM json_each({expr})))")
            }
        }
    }

    fn array_contains_all(&self, expr: &str, placeholder: &str) -> String {
        match self.0 {
            Dialect::PostgreSQL => format!("{expr} @> {placeholder}"),
            Dialect::SQLite => format!(
                "NOT EXISTS (SELECT 1 FROM json_each({placeholder}) WHERE value NOT IN (SELECT value FROM json_each({expr})))"
            ),
        }
    }

    fn array_is_empty(&self, expr: &str) -> String {
        match self.0 {
            Dialect::PostgreSQL => format!("{expr} = '{{}}'"),
            Dialect::SQLite => format!("(SELECT COUNT(*) FROM json_each({expr})) = 0"),
        }
    }

    fn array_is_not_empty(&self, expr: &str) -> String {
        match self.0 {
            Dialect::PostgreSQL => format!("{expr} <> '{{}}'"),
            Dialect::SQLite => format!("(SELECT COUNT(*) FROM json_each({expr})) > 0"),
        }
    }

    fn array_equals(&self, expr: &str, placeholder: &str) -> String {
        format!("{expr} = {placeholder}")
    }

    fn json_extract_text(&self, expr: &str, path_placeholder: &str) -> String {
        match self.0 {
            Dialect::PostgreSQL => format!("{expr} #>> {path_placeholder}"),
            Dialect::SQLite => format!("json_extract({expr}, {path_placeholder})"),
        }
    }

    fn json_extract_numeric(&self, expr: &str, path_placeholder: &str) -> String {
        format!("({})::numeric", self.json_extract_text(expr, path_placeholder))
    }

    fn json_to_text(&self, json_extract_text_expr: &str) -> String {
        json_extract_text_expr.to_string()
    }

    fn encode_json_path(&self, segments: &[CompactString]) -> Value {
        match self.0 {
            Dialect::PostgreSQL => Value::List(
                segments
                    .iter()
                    .map(|s| Value::Text(s.clone()))
                    .collect(),
            ),
            Dialect::SQLite => {
                let mut path = String::from("$");
                for s in segments {
                    path.push('.');
                    path.push_str(s.as_str());
                }
                Value::Text(CompactString::from(path))
            }
        }
    }

    fn case_insensitive_like(&self, expr: &str, placeholder: &str) -> String {
        match self.0 {
            Dialect::PostgreSQL => format!("{expr} ILIKE {placeholder}"),
            Dialect::SQLite => format!("{expr} LIKE {placeholder}"),
        }
    }

    fn case_insensitive_equals(&self, expr: &str, placeholder: &str) -> String {
        format!("LOWER({expr}) = LOWER({placeholder})")
    }

    fn build_table_reference(&self, schema: Option<&str>, table: &str) -> String {
        match (self.0, schema) {
            (Dialect::PostgreSQL, Some(schema)) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(table)),
            _ => self.quote_ident(table),
        }
    }
}
