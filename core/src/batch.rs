//! Batch/Transaction Sequencer: fuses independent `count` queries
//! into one round trip, and sequences a batch of statements inside an
//! explicit transaction (PostgreSQL only).

use std::collections::HashMap;

use compact_str::CompactString;

use crate::dialect::{Dialect, DialectAdapter};
use crate::error::CompileError;
use crate::params::Binding;

/// One independently-compiled `count` query to be folded into a single
/// fused statement. `sql` is the bare scalar-subquery body (e.g.
/// `SELECT COUNT(*) FROM "users" WHERE ...`), using its own 1-based
/// positional placeholders exactly as its own [`crate::params::ParamStore`]
/// produced them.
#[derive(Debug, Clone)]
pub struct CountQuery {
    pub alias: CompactString,
    pub sql: String,
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone)]
pub struct FusedBatchCount {
    pub sql: String,
    pub bindings: Vec<Binding>,
    pub count_aliases: Vec<CompactString>,
}

/// Fuses `queries` into one `SELECT (q1) AS a1, (q2) AS a2, ... ` statement,
/// reindexing each query's placeholders into a single outer position space.
/// Dynamic bindings sharing a name are deduplicated into one outer
/// position on PostgreSQL (whose numbered placeholders can be repeated
/// textually); SQLite's unnumbered placeholders cannot be reused this way,
/// so each reference keeps its own slot and duplicates the bound value
/// (still correct, just without the cross-query reuse optimization).
pub fn fuse_counts(adapter: &dyn DialectAdapter, queries: Vec<CountQuery>) -> Result<FusedBatchCount, CompileError> {
    if queries.is_empty() {
        return Err(CompileError::invalid_argument("batch count requires at least one query", ""));
    }

    let mut global_bindings: Vec<Binding> = Vec::new();
    let mut dynamic_positions: HashMap<CompactString, usize> = HashMap::new();
    let mut next_position = 1usize;
    let mut columns = Vec::with_capacity(queries.len());
    let mut aliases = Vec::with_capacity(queries.len());

    for query in queries {
        let mut local_to_global: HashMap<usize, usize> = HashMap::new();
        for binding in &query.bindings {
            match binding {
                Binding::Dynamic { position, name } => {
                    let global_position = *dynamic_positions.entry(name.clone()).or_insert_with(|| {
                        let p = next_position;
                        next_position += 1;
                        global_bindings.push(Binding::Dynamic { position: p, name: name.clone() });
                        p
                    });
                    local_to_global.insert(*position, global_position);
                }
                Binding::Static { position, value } => {
                    let global_position = next_position;
                    next_position += 1;
                    global_bindings.push(Binding::Static { position: global_position, value: value.clone() });
                    local_to_global.insert(*position, global_position);
                }
            }
        }

        let rewritten_sql = match adapter.dialect() {
            Dialect::PostgreSQL => remap_numbered_placeholders(&query.sql, '$', &local_to_global),
            Dialect::SQLite => query.sql.clone(),
        };

        columns.push(format!("({rewritten_sql}) AS {}", adapter.quote_ident(query.alias.as_str())));
        aliases.push(query.alias);
    }

    let sql = format!("SELECT {}", columns.join(", "));

    Ok(FusedBatchCount {
        sql,
        bindings: global_bindings,
        count_aliases: aliases,
    })
}

/// Rewrites every `<prefix><digits>` token in `sql` (e.g. `$3`) to use the
/// position `mapping` assigns it, leaving unmapped digit runs untouched.
fn remap_numbered_placeholders(sql: &str, prefix: char, mapping: &HashMap<usize, usize>) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == prefix && chars.peek().map(|d| d.is_ascii_digit()).unwrap_or(false) {
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let num: usize = digits.parse().expect("scanned only ascii digits");
            let new_num = mapping.get(&num).copied().unwrap_or(num);
            out.push(prefix);
            out.push_str(&new_num.to_string());
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn sql_name(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionPlan {
    pub statements: Vec<String>,
    pub isolation: IsolationLevel,
    pub statement_timeout_ms: Option<u64>,
}

const MAX_STATEMENT_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

/// Wraps an ordered batch of already-compiled statements in an explicit
/// transaction with the requested isolation level and optional statement
/// timeout. Only PostgreSQL carries real transactional DDL for
/// this; SQLite's single-writer model has no equivalent isolation-level
/// concept, so it always returns [`crate::error::ErrorKind::Unsupported`].
pub fn build_transaction(
    adapter: &dyn DialectAdapter,
    statements: Vec<String>,
    isolation: IsolationLevel,
    statement_timeout_ms: Option<u64>,
) -> Result<TransactionPlan, CompileError> {
    if adapter.dialect() == Dialect::SQLite {
        return Err(CompileError::unsupported("transactions with explicit isolation levels are PostgreSQL-only"));
    }
    if statements.is_empty() {
        return Err(CompileError::invalid_argument("transaction batch requires at least one statement", ""));
    }
    if let Some(timeout) = statement_timeout_ms {
        if timeout == 0 || timeout > MAX_STATEMENT_TIMEOUT_MS {
            return Err(CompileError::invalid_argument(
                format!("statement_timeout_ms must be in 1..={MAX_STATEMENT_TIMEOUT_MS}"),
                "statement_timeout_ms",
            ));
        }
    }

    let mut out = Vec::with_capacity(statements.len() + 2);
    out.push(format!("BEGIN ISOLATION LEVEL {}", isolation.sql_name()));
    if let Some(timeout) = statement_timeout_ms {
        out.push(format!("SET LOCAL statement_timeout = {timeout}"));
    }
    out.extend(statements);
    out.push("COMMIT".to_string());

    Ok(TransactionPlan {
        statements: out,
        isolation,
        statement_timeout_ms,
    })
}
