//! Identifier & Table Utilities: safe alias derivation and identifier
//! quoting, kept independent of any single dialect's `quote_ident` so it can
//! be reused by planner and reducer code that only deals with alias text.

use std::collections::HashSet;
use std::sync::OnceLock;

const MAX_ALIAS_LEN: usize = 50;

fn reserved_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| {
        [
            "select", "from", "where", "group", "order", "by", "having", "join", "left", "right",
            "inner", "outer", "on", "as", "and", "or", "not", "in", "is", "null", "limit",
            "offset", "distinct", "union", "all", "table", "insert", "update", "delete", "into",
            "values", "set", "case", "when", "then", "else", "end", "user", "primary", "key",
            "foreign", "references", "default", "unique", "check",
        ]
        .into_iter()
        .collect()
    })
}

/// Derives a safe, collision-avoiding alias from a table name: lowercase,
/// `[^a-z0-9_]` substituted with `_`, truncated to [`MAX_ALIAS_LEN`],
/// `_`-prefixed if it wouldn't otherwise start with a letter/underscore, and
/// `_t`-suffixed if it collides with a reserved word.
pub fn safe_alias(table_name: &str) -> String {
    let mut alias: String = table_name
        .chars()
        .map(|c| {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() || lower == '_' {
                lower
            } else {
                '_'
            }
        })
        .collect();

    alias.truncate(MAX_ALIAS_LEN);

    if alias.is_empty() {
        alias.push('_');
    }

    let starts_ok = alias
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !starts_ok {
        alias.insert(0, '_');
    }

    if reserved_words().contains(alias.as_str()) {
        alias.push_str("_t");
    }

    alias
}

/// Generates a fresh alias for a subquery/relation join by combining the
/// parent alias, relation name, and a depth-based disambiguator.
pub fn relation_alias(parent_alias: &str, relation_name: &str, depth: usize) -> String {
    safe_alias(&format!("{parent_alias}_{relation_name}_{depth}"))
}

/// Defensive check that `alias` could only have come from [`safe_alias`] or
/// [`relation_alias`] — guards against accidental raw-string concatenation
/// bypassing alias generation.
pub fn assert_safe_alias(alias: &str) -> bool {
    !alias.is_empty()
        && alias.len() <= MAX_ALIAS_LEN + 2
        && alias
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
        && alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Defensive check for a schema-qualified or bare table reference composed
/// only of identifier-safe segments separated by `.`.
pub fn assert_safe_table_ref(table_ref: &str) -> bool {
    table_ref
        .split('.')
        .all(|segment| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_substitutes() {
        assert_eq!(safe_alias("My-Table 2"), "my_table_2");
    }

    #[test]
    fn prefixes_when_leading_digit() {
        assert_eq!(safe_alias("2fast"), "_2fast");
    }

    #[test]
    fn suffixes_reserved_words() {
        assert_eq!(safe_alias("order"), "order_t");
    }

    #[test]
    fn truncates_long_names() {
        let long = "a".repeat(80);
        assert_eq!(safe_alias(&long).len(), MAX_ALIAS_LEN);
    }

    #[test]
    fn validates_generated_aliases() {
        assert!(assert_safe_alias(&safe_alias("Users")));
        assert!(assert_safe_alias(&safe_alias("order")));
        assert!(!assert_safe_alias("bad alias"));
    }
}
