//! Heterogeneous filter/binding values as a closed sum type, with a narrow
//! coercion layer from `serde_json::Value` at the API boundary.

use chrono::{DateTime, Utc};
use compact_str::CompactString;

use crate::error::CompileError;

/// A single value as it appears anywhere in a `QueryRequest`: a filter
/// operand, an order key, a pagination bound, ...
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision decimal, carried as text so no precision is lost
    /// compiling through `serde_json::Number`.
    Decimal(CompactString),
    BigInt(i128),
    Text(CompactString),
    /// Already-normalized ISO-8601 text; see [`normalize_datetime`].
    DateTime(CompactString),
    Json(serde_json::Value),
    List(Vec<Value>),
    /// A dynamic-parameter marker: resolved to a named binding instead of a
    /// literal at compile time.
    Dynamic(CompactString),
}

const DYNAMIC_MARKER_KEY: &str = "$dynamic";

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Decodes a dynamic-parameter marker, if `self` carries one.
    ///
    /// The wire encoding is `{"$dynamic": "<name>"}`, produced upstream by
    /// schema-directive ingestion (out of scope here).
    pub fn as_dynamic_name(&self) -> Option<&str> {
        match self {
            Value::Dynamic(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Coerces a raw `serde_json::Value` arriving at the API boundary into the
/// compiler's internal [`Value`]. Dates are normalized immediately so every
/// downstream consumer sees the same textual form.
pub fn coerce(raw: &serde_json::Value) -> Result<Value, CompileError> {
    match raw {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Ok(Value::Decimal(CompactString::from(n.to_string())))
            }
        }
        serde_json::Value::String(s) => Ok(Value::Text(CompactString::from(s.as_str()))),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(coerce(item)?);
            }
            Ok(Value::List(out))
        }
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(name)) = map.get(DYNAMIC_MARKER_KEY) {
                return Ok(Value::Dynamic(CompactString::from(name.as_str())));
            }
            if let Some(serde_json::Value::String(iso)) = map.get("$dateTime") {
                return Ok(Value::DateTime(normalize_datetime(iso)?));
            }
            Ok(Value::Json(serde_json::Value::Object(map.clone())))
        }
    }
}

/// Normalizes an arbitrary RFC3339-ish date-time string into the canonical
/// `YYYY-MM-DDTHH:MM:SS.sssZ` textual form.
pub fn normalize_datetime(raw: &str) -> Result<CompactString, CompileError> {
    let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CompileError::invalid_argument(format!("invalid date-time `{raw}`: {e}"), ""))?;
    Ok(CompactString::from(
        parsed.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_millis_and_z() {
        let got = normalize_datetime("2024-01-15T10:30:00Z").unwrap();
        assert_eq!(got.as_str(), "2024-01-15T10:30:00.000Z");
    }

    #[test]
    fn coerces_dynamic_marker() {
        let raw = serde_json::json!({"$dynamic": "userId"});
        let v = coerce(&raw).unwrap();
        assert_eq!(v.as_dynamic_name(), Some("userId"));
    }

    #[test]
    fn coerces_nested_list() {
        let raw = serde_json::json!([1, 2, 3]);
        let v = coerce(&raw).unwrap();
        assert_eq!(v.as_list().unwrap().len(), 3);
    }
}
