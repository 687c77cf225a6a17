//! Parameter Store: ordered static/dynamic bindings with deterministic
//! positions: a compiler-owned sequence of static values and named
//! dynamic-parameter references that can be snapshotted and continued.

use std::collections::HashMap;

use compact_str::CompactString;

use crate::dialect::DialectAdapter;
use crate::error::{CompileError, ErrorKind};
use crate::value::{normalize_datetime, Value};

/// A safe upper bound under which position arithmetic cannot overflow.
const MAX_SAFE_POSITION: usize = (i64::MAX as usize) - 1000;

/// One binding in the parameter vector: exactly one of a literal value or a
/// dynamic-parameter name, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Static { position: usize, value: Value },
    Dynamic { position: usize, name: CompactString },
}

impl Binding {
    pub fn position(&self) -> usize {
        match self {
            Binding::Static { position, .. } => *position,
            Binding::Dynamic { position, .. } => *position,
        }
    }
}

/// An immutable, shareable view of a store at a point in time.
#[derive(Debug, Clone, Default)]
pub struct ParamSnapshot {
    pub next_position: usize,
    pub bindings: Vec<Binding>,
}

/// Appends parameter bindings in compilation order, assigning each the next
/// dense position. A store may be fresh (`start_index = 1`) or continued
/// from a prior snapshot, which is how the HAVING builder extends the
/// WHERE builder's store in a single statement.
#[derive(Debug)]
pub struct ParamStore {
    next_position: usize,
    bindings: Vec<Binding>,
    dynamic_positions: HashMap<CompactString, usize>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::continued_from(1)
    }

    pub fn continued_from(start_index: usize) -> Self {
        Self {
            next_position: start_index,
            bindings: Vec::new(),
            dynamic_positions: HashMap::new(),
        }
    }

    pub fn from_snapshot(snapshot: &ParamSnapshot) -> Self {
        let mut dynamic_positions = HashMap::new();
        for binding in &snapshot.bindings {
            if let Binding::Dynamic { position, name } = binding {
                dynamic_positions.insert(name.clone(), *position);
            }
        }
        Self {
            next_position: snapshot.next_position,
            bindings: Vec::new(),
            dynamic_positions,
        }
    }

    fn reserve_position(&mut self) -> Result<usize, CompileError> {
        if self.next_position > MAX_SAFE_POSITION {
            return Err(CompileError::new(
                ErrorKind::ResourceLimit,
                "parameter position exceeds safe integer bound",
            ));
        }
        let position = self.next_position;
        self.next_position += 1;
        Ok(position)
    }

    /// Appends a static value and returns the rendered placeholder token.
    pub fn add_static(
        &mut self,
        adapter: &dyn DialectAdapter,
        value: Value,
    ) -> Result<String, CompileError> {
        let value = normalize(value)?;
        let position = self.reserve_position()?;
        self.bindings.push(Binding::Static { position, value });
        Ok(adapter.placeholder_for(position).into_owned())
    }

    /// Appends (or reuses) a dynamic binding; the same `name` always yields
    /// the same placeholder token within one compilation.
    pub fn add_dynamic(
        &mut self,
        adapter: &dyn DialectAdapter,
        name: impl Into<CompactString>,
    ) -> Result<String, CompileError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CompileError::invalid_argument(
                "dynamic parameter name must be non-empty",
                "",
            ));
        }
        if let Some(&position) = self.dynamic_positions.get(&name) {
            return Ok(adapter.placeholder_for(position).into_owned());
        }
        let position = self.reserve_position()?;
        self.dynamic_positions.insert(name.clone(), position);
        self.bindings.push(Binding::Dynamic { position, name });
        Ok(adapter.placeholder_for(position).into_owned())
    }

    /// Dispatches to [`ParamStore::add_dynamic`] when `value` carries a
    /// dynamic-parameter marker, else [`ParamStore::add_static`].
    pub fn add_auto(
        &mut self,
        adapter: &dyn DialectAdapter,
        value: Value,
    ) -> Result<String, CompileError> {
        match value.as_dynamic_name() {
            Some(name) => {
                let name = CompactString::from(name);
                self.add_dynamic(adapter, name)
            }
            None => self.add_static(adapter, value),
        }
    }

    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            next_position: self.next_position,
            bindings: self.bindings.clone(),
        }
    }

    pub fn next_position(&self) -> usize {
        self.next_position
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn into_bindings(self) -> Vec<Binding> {
        self.bindings
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively normalizes a [`Value`] before storage: dates to ISO-8601
/// text, arrays element-wise.
fn normalize(value: Value) -> Result<Value, CompileError> {
    match value {
        Value::Json(ref json) if json.is_string() => {
            // A bare JSON string masquerading as a date is left alone; only
            // explicit `$dateTime` markers (already normalized in `coerce`)
            // or raw strings passed directly to `normalize_datetime` change.
            Ok(value)
        }
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(normalize(item)?);
            }
            Ok(Value::List(out))
        }
        other => Ok(other),
    }
}

/// Normalizes a raw date-time string value directly into [`Value::DateTime`].
/// Exposed for operator modules that receive an un-coerced ISO string.
pub fn normalize_datetime_value(raw: &str) -> Result<Value, CompileError> {
    Ok(Value::DateTime(normalize_datetime(raw)?))
}
