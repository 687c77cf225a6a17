//! Per-relation cardinality statistics, supplied by an external,
//! out-of-scope statistics collector as a plain map.

use std::collections::HashMap;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelationStat {
    pub avg: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
    pub coverage: f64,
}

impl RelationStat {
    /// Checks the monotonicity invariant `avg <= p95 <= p99 <= max`, each
    /// `>= 1`, and `coverage` in `[0, 1]`.
    pub fn is_valid(&self) -> bool {
        self.avg >= 1.0
            && self.p95 >= self.avg
            && self.p99 >= self.p95
            && self.max >= self.p99
            && (0.0..=1.0).contains(&self.coverage)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelationStats {
    table: HashMap<(CompactString, CompactString), RelationStat>,
}

impl RelationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: impl Into<CompactString>, relation: impl Into<CompactString>, stat: RelationStat) {
        self.table.insert((parent.into(), relation.into()), stat);
    }

    pub fn get(&self, parent: &str, relation: &str) -> Option<RelationStat> {
        self.table.get(&(CompactString::from(parent), CompactString::from(relation))).copied()
    }

    /// Builds a table from the flat list a stats collector's JSON export
    /// deserializes into — a tuple-keyed `HashMap` has no direct JSON
    /// representation, so the wire format is a list of entries instead.
    pub fn from_entries(entries: impl IntoIterator<Item = RelationStatEntry>) -> Self {
        let mut table = HashMap::new();
        for entry in entries {
            table.insert((entry.parent, entry.relation), entry.stat);
        }
        Self { table }
    }

    pub fn to_entries(&self) -> Vec<RelationStatEntry> {
        self.table
            .iter()
            .map(|((parent, relation), stat)| RelationStatEntry {
                parent: parent.clone(),
                relation: relation.clone(),
                stat: *stat,
            })
            .collect()
    }
}

/// One row of [`RelationStats`]'s external wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationStatEntry {
    pub parent: CompactString,
    pub relation: CompactString,
    #[serde(flatten)]
    pub stat: RelationStat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_stats_collector_export_into_a_lookup_table() {
        let json = serde_json::json!([
            { "parent": "User", "relation": "posts", "avg": 2.0, "p95": 3.0, "p99": 4.0, "max": 5.0, "coverage": 1.0 },
        ]);
        let entries: Vec<RelationStatEntry> = serde_json::from_value(json).unwrap();
        let stats = RelationStats::from_entries(entries);
        let stat = stats.get("User", "posts").unwrap();
        assert_eq!(stat.avg, 2.0);
        assert!(stat.is_valid());
    }

    #[test]
    fn round_trips_through_entries() {
        let mut stats = RelationStats::new();
        stats.insert("User", "posts", RelationStat { avg: 2.0, p95: 3.0, p99: 4.0, max: 5.0, coverage: 1.0 });
        let entries = stats.to_entries();
        let rebuilt = RelationStats::from_entries(entries);
        assert_eq!(rebuilt.get("User", "posts"), stats.get("User", "posts"));
    }

    #[test]
    fn is_valid_rejects_non_monotonic_percentiles() {
        let stat = RelationStat { avg: 2.0, p95: 1.0, p99: 4.0, max: 5.0, coverage: 1.0 };
        assert!(!stat.is_valid());
    }
}
