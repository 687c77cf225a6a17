//! Dialect Adapter: the only place the two target SQL dialects diverge.
//!
//! A full set of named fragment generators so every builder stays
//! dialect-agnostic, threading an explicit `&dyn DialectAdapter` rather than
//! relying on process-wide dialect state.

use std::borrow::Cow;

/// Which SQL dialect a compilation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    PostgreSQL,
    SQLite,
}

/// Upper bound on parameters a single statement may carry for this dialect,
/// used by the WHERE-IN executor to chunk parent keys.
impl Dialect {
    pub fn max_params(self) -> usize {
        match self {
            Dialect::PostgreSQL => 32_000,
            Dialect::SQLite => 900,
        }
    }
}

/// Dialect-specific SQL fragment generation.
///
/// Every method returns a self-contained textual fragment built from
/// already-quoted identifiers and placeholder tokens; implementors never
/// see raw user strings, so they cannot introduce injection even if a
/// caller misuses them.
pub trait DialectAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Renders the placeholder for the 1-based parameter `position`.
    fn placeholder_for(&self, position: usize) -> Cow<'static, str>;

    /// `expr IN (...)` / `expr = ANY($n)` depending on dialect.
    fn in_array(&self, expr: &str, placeholder: &str) -> String;
    /// Negation of [`DialectAdapter::in_array`].
    fn not_in_array(&self, expr: &str, placeholder: &str) -> String;

    /// SQLite only: renders a small `IN (..)` list inline rather than
    /// through a single bound array parameter, below a tunable size cutoff.
    fn in_list_inline(&self, expr: &str, placeholders: &[String]) -> String {
        format!("{expr} IN ({})", placeholders.join(", "))
    }

    fn array_contains(&self, expr: &str, placeholder: &str) -> String;
    fn array_overlaps(&self, expr: &str, placeholder: &str) -> String;
    fn array_contains_all(&self, expr: &str, placeholder: &str) -> String;
    fn array_is_empty(&self, expr: &str) -> String;
    fn array_is_not_empty(&self, expr: &str) -> String;
    fn array_equals(&self, expr: &str, placeholder: &str) -> String;

    /// Extracts a JSON path as text. `path_placeholder` binds the path
    /// itself (PG: text array, SQLite: `$.a.b.c`).
    fn json_extract_text(&self, expr: &str, path_placeholder: &str) -> String;
    fn json_extract_numeric(&self, expr: &str, path_placeholder: &str) -> String;
    fn json_to_text(&self, json_extract_text_expr: &str) -> String;

    /// Encodes a JSON path as the literal value to be bound for
    /// `path_placeholder` above.
    fn encode_json_path(&self, segments: &[compact_str::CompactString]) -> crate::value::Value;

    fn case_insensitive_like(&self, expr: &str, placeholder: &str) -> String;
    fn case_insensitive_equals(&self, expr: &str, placeholder: &str) -> String;

    /// Double-quotes `name`, doubling any embedded quote.
    fn quote_ident(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 2);
        out.push('"');
        for ch in name.chars() {
            if ch == '"' {
                out.push('"');
            }
            out.push(ch);
        }
        out.push('"');
        out
    }

    /// Builds a fully-qualified table reference. PostgreSQL prepends the
    /// schema; SQLite has no schema concept and omits it.
    fn build_table_reference(&self, schema: Option<&str>, table: &str) -> String;
}

/// Writes a placeholder directly into a buffer without allocating for the
/// common `?` case.
#[inline]
pub fn write_placeholder(adapter: &dyn DialectAdapter, position: usize, out: &mut String) {
    match adapter.placeholder_for(position) {
        Cow::Borrowed(s) => out.push_str(s),
        Cow::Owned(s) => out.push_str(&s),
    }
}
