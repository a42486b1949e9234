//! Field reads on untyped objects
//!
//! Owners are fetched as `DynamicObject`s of whatever kind discovery
//! resolved, so their scale is read by path instead of through a typed
//! struct. Absence is distinct from a present-but-zero value.

use serde_json::Value;

/// A field along the path exists but has the wrong JSON type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path} accessor error: found {found}, expected {expected}")]
pub struct FieldTypeError {
    /// Dotted path up to and including the offending field
    pub path: String,
    /// JSON type that was found
    pub found: &'static str,
    /// JSON type that was required
    pub expected: &'static str,
}

/// Walk `path` through nested objects.
///
/// Returns `Ok(None)` when any segment is missing and an error when an
/// intermediate value is not an object.
pub fn nested_field<'a>(
    obj: &'a Value,
    path: &[&str],
) -> Result<Option<&'a Value>, FieldTypeError> {
    let mut current = obj;
    for (depth, segment) in path.iter().enumerate() {
        let map = current.as_object().ok_or_else(|| FieldTypeError {
            path: path[..depth].join("."),
            found: type_name(current),
            expected: "object",
        })?;
        match map.get(*segment) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Read an integer at `path`.
///
/// Floats, strings and `null` are type errors, not absence.
pub fn nested_i64(obj: &Value, path: &[&str]) -> Result<Option<i64>, FieldTypeError> {
    let Some(value) = nested_field(obj, path)? else {
        return Ok(None);
    };
    value.as_i64().map(Some).ok_or_else(|| FieldTypeError {
        path: path.join("."),
        found: type_name(value),
        expected: "integer",
    })
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
