//! Schema Adapters
//!
//! Each adapter maps one SBOM schema onto the shared node and edge vocabulary.
//! Adapters only describe batches; the writer facade submits them.

pub mod cyclonedx;
pub mod spdx;

pub use cyclonedx::CycloneDxAdapter;
pub use spdx::SpdxAdapter;

use crate::batch_writer::{EdgeBatch, NodeBatch};
use crate::error::{IngestError, IngestResult};
use crate::format::SbomFormat;
use crate::sanitizer::{sanitize, Record};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Node and Edge Labels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLabel {
    Document,
    Component,
    ExternalReference,
    Dependency,
    Vulnerability,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Document => "document",
            NodeLabel::Component => "component",
            NodeLabel::ExternalReference => "externalReference",
            NodeLabel::Dependency => "dependency",
            NodeLabel::Vulnerability => "vulnerability",
        }
    }
}

/// Types of relationships between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeLabel {
    /// Document describes its subject component or SPDX element
    Describes,
    /// Component belongs to the document or to a parent component
    PartOf,
    /// Component points at an external reference
    RefersTo,
    /// Document uses a top-level dependency
    Uses,
    /// Dependency depends on another dependency
    DependsOn,
    /// Vulnerability affects a component
    Affects,
}

impl EdgeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::Describes => "DESCRIBES",
            EdgeLabel::PartOf => "PART_OF",
            EdgeLabel::RefersTo => "REFERS_TO",
            EdgeLabel::Uses => "USES",
            EdgeLabel::DependsOn => "DEPENDS_ON",
            EdgeLabel::Affects => "AFFECTS",
        }
    }
}

// ============================================================================
// Adapter capability
// ============================================================================

/// Per-write facts shared by node and edge production.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentContext {
    pub document_id: String,
    pub ingested_at: DateTime<Utc>,
}

impl DocumentContext {
    /// A new document id; repeated writes of the same file never collide.
    pub fn fresh() -> Self {
        Self {
            document_id: format!("{}_{}", NodeLabel::Document.as_str(), Uuid::new_v4()),
            ingested_at: Utc::now(),
        }
    }
}

pub trait SbomAdapter: Send + Sync {
    fn format(&self) -> SbomFormat;

    /// Node batches in submission order.
    fn node_batches(&self, document: &Record, ctx: &DocumentContext) -> IngestResult<Vec<NodeBatch>>;

    /// Edge batches; only submitted after every node batch.
    fn edge_batches(&self, document: &Record, ctx: &DocumentContext) -> IngestResult<Vec<EdgeBatch>>;
}

// ============================================================================
// Shared helpers
// ============================================================================

/// The objects under `key`, or nothing when the section is absent.
pub(crate) fn records_at(parent: &Record, key: &str) -> IngestResult<Vec<Record>> {
    match parent.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object().cloned().ok_or_else(|| {
                    IngestError::InvalidDocument(format!("'{}' entries must be objects, found {}", key, item))
                })
            })
            .collect(),
        Some(other) => Err(IngestError::InvalidDocument(format!(
            "'{}' must be an array, found {}",
            key, other
        ))),
    }
}

pub(crate) fn object_at<'a>(parent: &'a Record, key: &str) -> IngestResult<Option<&'a Record>> {
    match parent.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(IngestError::InvalidDocument(format!(
            "'{}' must be an object, found {}",
            key, other
        ))),
    }
}

pub(crate) fn rename(record: &mut Record, from: &str, to: &str) {
    if let Some(value) = record.remove(from) {
        record.insert(to.to_string(), value);
    }
}

/// Splits `records` into keyed batches whose members share one scalar field
/// set, so each batch's `SET` template covers all of its rows.
///
/// Groups keep the order in which their first record appeared.
pub(crate) fn keyed_batches(label: &str, key_field: &str, records: Vec<Record>) -> Vec<NodeBatch> {
    let mut slots: HashMap<Vec<String>, usize> = HashMap::new();
    let mut groups: Vec<Vec<Record>> = Vec::new();
    for record in records {
        let fields: Vec<String> = sanitize(&record).keys().cloned().collect();
        let slot = *slots.entry(fields).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(record);
    }
    groups
        .into_iter()
        .map(|group| NodeBatch::keyed(label, key_field, group))
        .collect()
}

/// Copies every entry of `overlay` onto `base`; later layers win.
pub(crate) fn merge_into(base: &mut Record, overlay: &Record) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}
