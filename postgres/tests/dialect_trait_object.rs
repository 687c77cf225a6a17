//! Exercises `PostgresDialect` behind `&dyn DialectAdapter`, the way the
//! compiler core actually consumes it, rather than through the concrete
//! type directly.

use qcompiler_core::dialect::{Dialect, DialectAdapter};
use qcompiler_postgres::PostgresDialect;

fn adapter() -> Box<dyn DialectAdapter> {
    Box::new(PostgresDialect)
}

#[test]
fn reports_postgresql_dialect() {
    assert_eq!(adapter().dialect(), Dialect::PostgreSQL);
}

#[test]
fn quote_ident_escapes_embedded_quotes() {
    let adapter = adapter();
    assert_eq!(adapter.quote_ident("weird\"name"), "\"weird\"\"name\"");
}

#[test]
fn not_in_array_negates_equals_any() {
    let adapter = adapter();
    assert_eq!(adapter.not_in_array("\"status\"", "$1"), "NOT (\"status\" = ANY($1))");
}

#[test]
fn array_is_empty_compares_to_empty_literal() {
    let adapter = adapter();
    assert_eq!(adapter.array_is_empty("\"tags\""), "\"tags\" = '{}'");
}

#[test]
fn case_insensitive_like_uses_ilike() {
    let adapter = adapter();
    assert_eq!(adapter.case_insensitive_like("\"email\"", "$1"), "\"email\" ILIKE $1");
}
