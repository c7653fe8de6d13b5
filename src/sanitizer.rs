//! Property Sanitizer
//!
//! Graph property values must be scalars, so list and map fields are dropped
//! before a record is sent as a property map.

use serde_json::{Map, Value};

/// A decoded JSON object as handed around by the adapters.
pub type Record = Map<String, Value>;

/// Returns `true` for values the store accepts as a property (null included).
pub fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

pub fn sanitize(record: &Record) -> Record {
    record
        .iter()
        .filter(|(_, value)| is_scalar(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
