//! Identity Resolver
//!
//! Node ids are `{label}_{key}` for keyed records. Records without a key fall
//! back to a generated token or a caller-fixed id, in that order.

use crate::error::{IngestError, IngestResult};
use crate::sanitizer::Record;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityOptions {
    /// Generate `{label}_{uuid}` when the key field is absent.
    pub generate_if_missing: bool,
    /// Used verbatim when the key field is absent and nothing is generated.
    pub fixed_id: Option<String>,
}

impl IdentityOptions {
    pub fn keyed() -> Self {
        Self::default()
    }

    pub fn generated() -> Self {
        Self {
            generate_if_missing: true,
            fixed_id: None,
        }
    }

    pub fn fixed(id: impl Into<String>) -> Self {
        Self {
            generate_if_missing: false,
            fixed_id: Some(id.into()),
        }
    }
}

/// Renders a key value the way it appears inside a node id.
///
/// Strings are used raw; other scalars use their JSON text.
pub fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn node_id(label: &str, key: &Value) -> String {
    format!("{}_{}", label, key_text(key))
}

pub fn resolve_identity(
    record: &Record,
    label: &str,
    key_field: Option<&str>,
    options: &IdentityOptions,
) -> IngestResult<String> {
    if let Some(key) = key_field.and_then(|field| record.get(field)) {
        if !key.is_null() {
            return Ok(node_id(label, key));
        }
    }

    if options.generate_if_missing {
        return Ok(format!("{}_{}", label, Uuid::new_v4().simple()));
    }

    if let Some(fixed) = &options.fixed_id {
        return Ok(fixed.clone());
    }

    Err(IngestError::MissingIdentityKey {
        label: label.to_string(),
        key: key_field.unwrap_or("<none>").to_string(),
        record: Value::Object(record.clone()),
    })
}
