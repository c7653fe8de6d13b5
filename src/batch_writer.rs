//! Batch Upsert Engine
//!
//! Turns record lists into chunked, deduplicated `UNWIND ... MERGE` queries.
//! Nodes merge on the reserved `` `~id` `` property; edges match their
//! endpoints either by that id or by any declared property.

use crate::error::{ChunkFailure, IngestResult};
use crate::executor::GraphQueryExecutor;
use crate::identity::{resolve_identity, IdentityOptions};
use crate::retry::backoff_delay;
use crate::sanitizer::{sanitize, Record};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Store-side identity property every node merges on.
pub const ID_PROPERTY: &str = "~id";

/// Parameter field carrying the resolved identifier in each node row.
pub const ID_FIELD: &str = "__id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Chunks of one batch allowed in flight at once.
    pub max_concurrency: usize,
    pub chunk_timeout: Duration,
    /// Total attempts per chunk, first try included.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: 1,
            chunk_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
        }
    }
}

// ============================================================================
// Batches and reports
// ============================================================================

/// A homogeneous list of records bound for one node label.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeBatch {
    pub label: String,
    pub key_field: Option<String>,
    pub identity: IdentityOptions,
    pub records: Vec<Record>,
}

impl NodeBatch {
    pub fn keyed(label: &str, key_field: &str, records: Vec<Record>) -> Self {
        Self {
            label: label.to_string(),
            key_field: Some(key_field.to_string()),
            identity: IdentityOptions::keyed(),
            records,
        }
    }

    /// A singleton batch whose id is fixed by the caller.
    pub fn fixed(label: &str, id: &str, record: Record) -> Self {
        Self {
            label: label.to_string(),
            key_field: None,
            identity: IdentityOptions::fixed(id),
            records: vec![record],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRow {
    pub from: Value,
    pub to: Value,
}

impl EdgeRow {
    pub fn new(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointMatch {
    /// Both sides carry node ids in `{label}_{key}` form.
    ById,
    ByProperty {
        from_property: String,
        to_property: String,
    },
}

impl EndpointMatch {
    pub fn by_property(from_property: &str, to_property: &str) -> Self {
        EndpointMatch::ByProperty {
            from_property: from_property.to_string(),
            to_property: to_property.to_string(),
        }
    }

    /// Property names the `from` and `to` sides are matched on.
    pub fn properties(&self) -> (&str, &str) {
        match self {
            EndpointMatch::ById => (ID_PROPERTY, ID_PROPERTY),
            EndpointMatch::ByProperty {
                from_property,
                to_property,
            } => (from_property, to_property),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeBatch {
    pub label: String,
    pub endpoints: EndpointMatch,
    pub edges: Vec<EdgeRow>,
}

impl EdgeBatch {
    pub fn by_id(label: &str, edges: Vec<EdgeRow>) -> Self {
        Self {
            label: label.to_string(),
            endpoints: EndpointMatch::ById,
            edges,
        }
    }

    pub fn by_property(label: &str, from_property: &str, to_property: &str, edges: Vec<EdgeRow>) -> Self {
        Self {
            label: label.to_string(),
            endpoints: EndpointMatch::by_property(from_property, to_property),
            edges,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ChunkStatus {
    Committed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkOutcome {
    pub chunk_index: usize,
    /// Rows sent after deduplication.
    pub rows: usize,
    pub duplicates_dropped: usize,
    pub attempts: u32,
    #[serde(flatten)]
    pub status: ChunkStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub label: String,
    pub chunks: Vec<ChunkOutcome>,
}

impl BatchReport {
    pub fn empty(label: &str) -> Self {
        Self {
            label: label.to_string(),
            chunks: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.chunks
            .iter()
            .all(|chunk| chunk.status == ChunkStatus::Committed)
    }

    pub fn rows_committed(&self) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| chunk.status == ChunkStatus::Committed)
            .map(|chunk| chunk.rows)
            .sum()
    }

    pub fn failures(&self) -> Vec<ChunkFailure> {
        self.chunks
            .iter()
            .filter_map(|chunk| match &chunk.status {
                ChunkStatus::Failed(reason) => Some(ChunkFailure {
                    label: self.label.clone(),
                    chunk_index: chunk.chunk_index,
                    attempts: chunk.attempts,
                    reason: reason.clone(),
                }),
                ChunkStatus::Committed => None,
            })
            .collect()
    }
}

/// Node rows with identities resolved, ready to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedNodes {
    pub label: String,
    /// Properties the query's `SET` clause writes.
    pub fields: Vec<String>,
    pub query: String,
    pub rows: Vec<Record>,
}

impl PreparedNodes {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(|row| row.get(ID_FIELD).and_then(Value::as_str))
    }
}

// ============================================================================
// Query templates
// ============================================================================

fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn node_upsert_query(label: &str, fields: &[String]) -> String {
    let mut q = format!(
        "UNWIND $props AS p\nMERGE (s:{} {{{}: p.{}}})",
        quote(label),
        quote(ID_PROPERTY),
        ID_FIELD
    );
    if !fields.is_empty() {
        let assignments: Vec<String> = fields
            .iter()
            .map(|field| format!("s.{0} = p.{0}", quote(field)))
            .collect();
        q.push_str("\nSET ");
        q.push_str(&assignments.join(", "));
    }
    q
}

pub fn edge_by_id_query(label: &str) -> String {
    format!(
        "UNWIND $rels AS r\nMATCH (from {{{id}: r.fromId}})\nMATCH (to {{{id}: r.toId}})\nMERGE (from)-[:{label}]->(to)",
        id = quote(ID_PROPERTY),
        label = quote(label)
    )
}

pub fn edge_by_property_query(label: &str, from_property: &str, to_property: &str) -> String {
    format!(
        "UNWIND $rels AS r\nMATCH (from {{{}: r.from}})\nMATCH (to {{{}: r.to}})\nMERGE (from)-[:{}]->(to)",
        quote(from_property),
        quote(to_property),
        quote(label)
    )
}

/// Keeps only the last row per identity so concurrent chunks never merge the
/// same node. Node rows are keyed by `__id`, edge rows by their whole text.
fn collapse_shared_identities(rows: &[Value]) -> Vec<Value> {
    let identity = |row: &Value| match row.get(ID_FIELD) {
        Some(id) => id.to_string(),
        None => row.to_string(),
    };
    let mut last: HashMap<String, usize> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        last.insert(identity(row), index);
    }
    rows.iter()
        .enumerate()
        .filter(|(index, row)| last.get(&identity(*row)) == Some(index))
        .map(|(_, row)| row.clone())
        .collect()
}

/// Drops rows equal in every field, keeping first occurrences.
///
/// `serde_json::Map` keeps keys sorted, so the JSON text is a canonical key.
fn dedup_rows(rows: &[Value]) -> Vec<Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| seen.insert(row.to_string()))
        .cloned()
        .collect()
}

// ============================================================================
// Writer
// ============================================================================

pub struct BatchWriter {
    executor: Arc<dyn GraphQueryExecutor>,
    config: BatchConfig,
}

impl BatchWriter {
    pub fn new(executor: Arc<dyn GraphQueryExecutor>, config: BatchConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Sanitizes every record and resolves its identity without touching the store.
    ///
    /// The `SET` field list comes from the first record only; callers supply
    /// field-homogeneous batches.
    pub fn prepare_nodes(
        &self,
        records: &[Record],
        label: &str,
        key_field: Option<&str>,
        options: &IdentityOptions,
    ) -> IngestResult<PreparedNodes> {
        let Some(first) = records.first() else {
            return Ok(PreparedNodes {
                label: label.to_string(),
                fields: Vec::new(),
                query: String::new(),
                rows: Vec::new(),
            });
        };

        let fields: Vec<String> = sanitize(first)
            .keys()
            .filter(|field| field.as_str() != ID_FIELD)
            .cloned()
            .collect();

        let rows = records
            .iter()
            .map(|record| {
                let id = resolve_identity(record, label, key_field, options)?;
                let mut row = sanitize(record);
                row.insert(ID_FIELD.to_string(), Value::String(id));
                Ok(row)
            })
            .collect::<IngestResult<Vec<_>>>()?;

        let uncovered = rows
            .iter()
            .filter(|row| row.keys().any(|k| k != ID_FIELD && !fields.contains(k)))
            .count();
        if uncovered > 0 {
            warn!(
                "⚠️  {} {} row(s) carry fields outside the batch template; those fields are not written",
                uncovered, label
            );
        }

        Ok(PreparedNodes {
            label: label.to_string(),
            query: node_upsert_query(label, &fields),
            fields,
            rows,
        })
    }

    pub async fn submit_nodes(&self, prepared: &PreparedNodes) -> BatchReport {
        if prepared.rows.is_empty() {
            return BatchReport::empty(&prepared.label);
        }

        let rows: Vec<Value> = prepared.rows.iter().cloned().map(Value::Object).collect();
        let report = self
            .submit_chunks(&prepared.label, &prepared.query, "props", &rows)
            .await;

        info!("   Upserted {} {} nodes", report.rows_committed(), prepared.label);
        report
    }

    pub async fn upsert_nodes(
        &self,
        records: &[Record],
        label: &str,
        key_field: Option<&str>,
        options: &IdentityOptions,
    ) -> IngestResult<BatchReport> {
        let prepared = self.prepare_nodes(records, label, key_field, options)?;
        Ok(self.submit_nodes(&prepared).await)
    }

    pub async fn upsert_edges_by_id(&self, edges: &[EdgeRow], label: &str) -> BatchReport {
        if edges.is_empty() {
            return BatchReport::empty(label);
        }

        let rows: Vec<Value> = edges
            .iter()
            .map(|edge| json!({"fromId": edge.from, "toId": edge.to}))
            .collect();
        let report = self
            .submit_chunks(label, &edge_by_id_query(label), "rels", &rows)
            .await;

        info!("   Merged {} {} edges", report.rows_committed(), label);
        report
    }

    pub async fn upsert_edges_by_property(
        &self,
        edges: &[EdgeRow],
        label: &str,
        from_property: &str,
        to_property: &str,
    ) -> BatchReport {
        if edges.is_empty() {
            return BatchReport::empty(label);
        }

        let rows: Vec<Value> = edges
            .iter()
            .map(|edge| json!({"from": edge.from, "to": edge.to}))
            .collect();
        let query = edge_by_property_query(label, from_property, to_property);
        let report = self.submit_chunks(label, &query, "rels", &rows).await;

        info!(
            "   Merged {} {} edges ({} -> {})",
            report.rows_committed(),
            label,
            from_property,
            to_property
        );
        report
    }

    pub async fn upsert_edges(&self, batch: &EdgeBatch) -> BatchReport {
        match &batch.endpoints {
            EndpointMatch::ById => self.upsert_edges_by_id(&batch.edges, &batch.label).await,
            EndpointMatch::ByProperty {
                from_property,
                to_property,
            } => {
                self.upsert_edges_by_property(&batch.edges, &batch.label, from_property, to_property)
                    .await
            }
        }
    }

    async fn submit_chunks(&self, label: &str, query: &str, param: &str, rows: &[Value]) -> BatchReport {
        let batch_size = self.config.batch_size.max(1);
        let concurrency = self.config.max_concurrency.max(1);

        let collapsed;
        let rows = if concurrency > 1 {
            collapsed = collapse_shared_identities(rows);
            if collapsed.len() < rows.len() {
                debug!(
                    "{}: collapsed {} row(s) sharing an identity before concurrent submission",
                    label,
                    rows.len() - collapsed.len()
                );
            }
            collapsed.as_slice()
        } else {
            rows
        };

        let mut chunks: Vec<ChunkOutcome> = stream::iter(rows.chunks(batch_size).enumerate())
            .map(|(index, chunk)| self.submit_chunk(label, query, param, index, chunk))
            .buffer_unordered(concurrency)
            .collect()
            .await;
        chunks.sort_by_key(|chunk| chunk.chunk_index);

        BatchReport {
            label: label.to_string(),
            chunks,
        }
    }

    async fn submit_chunk(
        &self,
        label: &str,
        query: &str,
        param: &str,
        index: usize,
        chunk: &[Value],
    ) -> ChunkOutcome {
        let unique = dedup_rows(chunk);
        let duplicates_dropped = chunk.len() - unique.len();
        if duplicates_dropped > 0 {
            debug!("{}[chunk {}]: dropped {} duplicate row(s)", label, index, duplicates_dropped);
        }
        let rows = unique.len();

        let mut params = serde_json::Map::new();
        params.insert(param.to_string(), Value::Array(unique));
        let params = Value::Object(params);

        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match timeout(self.config.chunk_timeout, self.executor.execute(query, &params)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(_) => Err(format!("timed out after {:?}", self.config.chunk_timeout)),
            };

            match result {
                Ok(()) => {
                    return ChunkOutcome {
                        chunk_index: index,
                        rows,
                        duplicates_dropped,
                        attempts: attempt,
                        status: ChunkStatus::Committed,
                    };
                }
                Err(reason) if attempt < max_attempts => {
                    let wait = backoff_delay(self.config.retry_base_delay, attempt);
                    warn!(
                        "⚠️  {}[chunk {}] failed: {}. Retrying in {:?} (attempt {}/{})...",
                        label, index, reason, wait, attempt, max_attempts
                    );
                    sleep(wait).await;
                }
                Err(reason) => {
                    error!(
                        "❌ An error occurred saving the {} (chunk {}, {} rows) after {} attempt(s): {}",
                        label, index, rows, attempt, reason
                    );
                    return ChunkOutcome {
                        chunk_index: index,
                        rows,
                        duplicates_dropped,
                        attempts: attempt,
                        status: ChunkStatus::Failed(reason),
                    };
                }
            }
        }
    }
}
