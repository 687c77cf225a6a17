//! Operator Modules: scalar, array, and JSON operator builders.
//!
//! Every operator here returns a self-contained SQL fragment and consumes
//! bindings exclusively through [`crate::params::ParamStore`] — none of
//! them ever concatenates a user-provided string directly into the
//! returned fragment.

pub mod array;
pub mod json;
pub mod scalar;

/// Recursion limit for nested `not` objects.
pub const MAX_NOT_DEPTH: usize = 50;

/// Maximum element count accepted by array operators.
pub const MAX_ARRAY_SIZE: usize = 10_000;

/// Reads the sibling `mode: "insensitive"` attribute next to a string
/// operator. This is a per-comparison attribute, not an operator in its
/// own right, so it never appears in operator dispatch.
pub fn is_case_insensitive(obj: &serde_json::Map<String, serde_json::Value>) -> bool {
    matches!(obj.get("mode"), Some(serde_json::Value::String(s)) if s == "insensitive")
}
