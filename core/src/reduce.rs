//! Row Reducer: stitches flat joined rows produced by an embedded
//! [`crate::planner::IncludePlan`] back into nested object graphs, plus a
//! pull-based streaming variant for callers that cannot buffer the whole
//! result set.

use std::collections::HashMap;

use compact_str::CompactString;
use serde_json::{Map, Value};

use crate::error::CompileError;
use crate::planner::{IncludePlan, RelationPlan, RelationStrategy, ScalarColumnSpec};

/// Reads `spec`'s column out of `row`, parsing it as JSON when the column
/// is JSON-typed. A driver hands back a JSON-typed column either already
/// parsed (e.g. Postgres's `jsonb`) or as its raw encoded text (e.g.
/// SQLite's `TEXT`); only the latter needs decoding.
fn materialize_value(row: &FlatRow, spec: &ScalarColumnSpec) -> Result<Value, CompileError> {
    let raw = row.get(&spec.alias).cloned().unwrap_or(Value::Null);
    if !spec.is_json {
        return Ok(raw);
    }
    match raw {
        Value::String(s) => serde_json::from_str(&s)
            .map_err(|e| CompileError::state_corruption(format!("column `{}` held invalid JSON: {e}", spec.alias))),
        other => Ok(other),
    }
}

pub const MAX_REDUCE_DEPTH: usize = 10;

/// One flat row as returned by the driver: column label (matching a
/// [`crate::planner::ScalarColumnSpec::alias`] or
/// [`crate::planner::ScalarColumnSpec`]-equivalent pk alias) to value.
pub type FlatRow = HashMap<CompactString, Value>;

/// Reduces every flat row in `rows` against `plan` into nested JSON objects,
/// preserving first-seen order of parent records and deduplicating parents
/// and children by primary key: stable order, no duplicate child entries.
pub fn reduce_rows(plan: &IncludePlan, rows: &[FlatRow]) -> Result<Vec<Value>, CompileError> {
    let mut order: Vec<CompositeKey> = Vec::new();
    let mut parents: HashMap<CompositeKey, Map<String, Value>> = HashMap::new();

    for row in rows {
        let parent_key = composite_key(row, &plan.parent_pk_aliases)?;
        let Some(parent_key) = parent_key else {
            // A row with a null parent primary key cannot be stitched; this
            // only happens for an outer-joined parent, which this planner
            // never emits (the driving table is never the right side of a
            // LEFT JOIN), so treat it as a state-corruption guard.
            return Err(CompileError::state_corruption("row reducer encountered a null parent primary key"));
        };

        if !parents.contains_key(&parent_key) {
            order.push(parent_key.clone());
            let mut obj = Map::new();
            for scalar in &plan.scalars {
                obj.insert(scalar.alias.to_string(), materialize_value(row, scalar)?);
            }
            parents.insert(parent_key.clone(), obj);
        }
        let entry = parents.get_mut(&parent_key).expect("inserted above");

        merge_relations(entry, &plan.relations, row, 0)?;
    }

    Ok(order
        .into_iter()
        .map(|key| Value::Object(parents.remove(&key).expect("inserted above")))
        .collect())
}

/// Composite primary key: `None` if any component is SQL NULL (used to
/// recognize an absent optional relation row from a LEFT JOIN).
type CompositeKey = Vec<CompactKeyPart>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CompactKeyPart {
    Int(i64),
    Text(CompactString),
    Bool(bool),
}

fn composite_key(row: &FlatRow, pk_aliases: &[CompactString]) -> Result<Option<CompositeKey>, CompileError> {
    let mut parts = Vec::with_capacity(pk_aliases.len());
    for alias in pk_aliases {
        match row.get(alias) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) if n.is_i64() => parts.push(CompactKeyPart::Int(n.as_i64().unwrap())),
            Some(Value::Number(n)) => parts.push(CompactKeyPart::Text(CompactString::from(n.to_string()))),
            Some(Value::String(s)) => parts.push(CompactKeyPart::Text(CompactString::from(s.as_str()))),
            Some(Value::Bool(b)) => parts.push(CompactKeyPart::Bool(*b)),
            Some(other) => {
                return Err(CompileError::state_corruption(format!(
                    "primary key column held a non-scalar value: {other:?}"
                )))
            }
        }
    }
    Ok(Some(parts))
}

fn merge_relations(parent: &mut Map<String, Value>, relations: &[RelationPlan], row: &FlatRow, depth: usize) -> Result<(), CompileError> {
    if depth > MAX_REDUCE_DEPTH {
        return Err(CompileError::depth_exceeded(MAX_REDUCE_DEPTH, "reduce"));
    }
    for relation in relations {
        if relation.strategy != RelationStrategy::Embed {
            // WHERE-IN relations are stitched in a separate pass once their
            // own query has returned, not from this row.
            continue;
        }
        let child_pk_aliases: Vec<CompactString> = relation.pk_projections.iter().map(|p| p.alias.clone()).collect();
        let child_key = composite_key(row, &child_pk_aliases)?;

        match relation.cardinality {
            crate::model::Cardinality::One => {
                let slot = parent.entry(relation.name.to_string()).or_insert(Value::Null);
                if matches!(slot, Value::Null) {
                    if let Some(child_key) = &child_key {
                        let mut child_obj = build_child_object(relation, row)?;
                        if let Some(nested) = &relation.nested {
                            merge_relations(&mut child_obj, &nested.relations, row, depth + 1)?;
                        }
                        let _ = child_key;
                        *slot = Value::Object(child_obj);
                    }
                }
            }
            crate::model::Cardinality::Many => {
                let slot = parent
                    .entry(relation.name.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let Value::Array(items) = slot else {
                    return Err(CompileError::state_corruption("expected array slot for to-many relation"));
                };
                if let Some(child_key) = &child_key {
                    let already_present = items.iter().any(|item| {
                        matches!(item, Value::Object(obj) if relation_matches_key(obj, &relation.pk_projections, child_key))
                    });
                    if !already_present {
                        let mut child_obj = build_child_object(relation, row)?;
                        if let Some(nested) = &relation.nested {
                            merge_relations(&mut child_obj, &nested.relations, row, depth + 1)?;
                        }
                        items.push(Value::Object(child_obj));
                    } else if let Some(nested) = &relation.nested {
                        if let Some(existing) = items.iter_mut().find(|item| {
                            matches!(item, Value::Object(obj) if relation_matches_key(obj, &relation.pk_projections, child_key))
                        }) {
                            if let Value::Object(existing_obj) = existing {
                                merge_relations(existing_obj, &nested.relations, row, depth + 1)?;
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn build_child_object(relation: &RelationPlan, row: &FlatRow) -> Result<Map<String, Value>, CompileError> {
    let mut obj = Map::new();
    for pk in &relation.pk_projections {
        let local_name = pk.alias.rsplit('.').next().unwrap_or(pk.alias.as_str());
        obj.insert(local_name.to_string(), materialize_value(row, pk)?);
    }
    if let Some(nested) = &relation.nested {
        for scalar in &nested.scalars {
            let local_name = scalar.alias.rsplit('.').next().unwrap_or(scalar.alias.as_str());
            obj.insert(local_name.to_string(), materialize_value(row, scalar)?);
        }
    }
    Ok(obj)
}

fn relation_matches_key(obj: &Map<String, Value>, pk_projections: &[crate::planner::ScalarColumnSpec], key: &CompositeKey) -> bool {
    for (pk, part) in pk_projections.iter().zip(key.iter()) {
        let local_name = pk.alias.rsplit('.').next().unwrap_or(pk.alias.as_str());
        let Some(current) = obj.get(local_name) else { return false };
        let matches = match (current, part) {
            (Value::Number(n), CompactKeyPart::Int(i)) => n.as_i64() == Some(*i),
            (Value::String(s), CompactKeyPart::Text(t)) => s.as_str() == t.as_str(),
            (Value::Bool(b), CompactKeyPart::Bool(t)) => b == t,
            _ => false,
        };
        if !matches {
            return false;
        }
    }
    true
}

/// Pull-based reducer for callers streaming rows from a cursor instead of
/// buffering the full result set: feed rows one at a time via
/// [`StreamingReducer::process_row`] and drain a parent as soon as its key
/// changes, since rows for one embedded-join parent are guaranteed
/// contiguous by the planner's deterministic ordering.
pub struct StreamingReducer<'a> {
    plan: &'a IncludePlan,
    current_key: Option<CompositeKey>,
    current_object: Option<Map<String, Value>>,
}

impl<'a> StreamingReducer<'a> {
    pub fn new(plan: &'a IncludePlan) -> Self {
        Self {
            plan,
            current_key: None,
            current_object: None,
        }
    }

    /// Feeds one row. Returns `Some(completed_parent)` if this row started a
    /// new parent, meaning the previous parent is now fully materialized.
    pub fn process_row(&mut self, row: &FlatRow) -> Result<Option<Value>, CompileError> {
        let parent_key = composite_key(row, &self.plan.parent_pk_aliases)?
            .ok_or_else(|| CompileError::state_corruption("row reducer encountered a null parent primary key"))?;

        let mut completed = None;
        if self.current_key.as_ref() != Some(&parent_key) {
            if let (Some(_), Some(obj)) = (self.current_key.take(), self.current_object.take()) {
                completed = Some(Value::Object(obj));
            }
            let mut obj = Map::new();
            for scalar in &self.plan.scalars {
                obj.insert(scalar.alias.to_string(), materialize_value(row, scalar)?);
            }
            self.current_object = Some(obj);
            self.current_key = Some(parent_key);
        }

        let obj = self.current_object.as_mut().expect("set above");
        merge_relations(obj, &self.plan.relations, row, 0)?;
        Ok(completed)
    }

    pub fn current_parent_key(&self) -> Option<&[CompactKeyPart]> {
        self.current_key.as_deref()
    }

    /// Call once input is exhausted to flush the final in-progress parent.
    pub fn into_remaining(self) -> Option<Value> {
        self.current_object.map(Value::Object)
    }
}
