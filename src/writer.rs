//! Writer Facade
//!
//! Routes a decoded document to its schema adapter, submits every node batch
//! before any edge batch, and folds per-chunk outcomes into one report.

use crate::adapters::{CycloneDxAdapter, DocumentContext, SbomAdapter, SpdxAdapter};
use crate::batch_writer::{BatchConfig, BatchReport, BatchWriter, EdgeBatch, PreparedNodes, ID_FIELD, ID_PROPERTY};
use crate::error::{ChunkFailure, DanglingEndpoint, IngestError, IngestResult};
use crate::executor::GraphQueryExecutor;
use crate::format::SbomFormat;
use crate::metrics::{instrumented, MetricsSink, NoopMetrics};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub document_id: String,
    pub format: SbomFormat,
    pub node_batches: Vec<BatchReport>,
    pub edge_batches: Vec<BatchReport>,
    pub dangling_endpoints: usize,
}

impl DocumentReport {
    pub fn is_success(&self) -> bool {
        self.batches().all(BatchReport::is_success)
    }

    pub fn failures(&self) -> Vec<ChunkFailure> {
        self.batches().flat_map(BatchReport::failures).collect()
    }

    pub fn nodes_committed(&self) -> usize {
        self.node_batches.iter().map(BatchReport::rows_committed).sum()
    }

    pub fn edges_committed(&self) -> usize {
        self.edge_batches.iter().map(BatchReport::rows_committed).sum()
    }

    fn batches(&self) -> impl Iterator<Item = &BatchReport> {
        self.node_batches.iter().chain(self.edge_batches.iter())
    }
}

/// Every endpoint value the document's own node writes can satisfy, per property.
///
/// Only `~id` and the fields a batch's template sets are indexed; anything
/// else in a row never reaches the store.
struct EndpointIndex {
    values: HashMap<String, HashSet<String>>,
}

impl EndpointIndex {
    fn from_prepared(prepared: &[PreparedNodes]) -> Self {
        let mut values: HashMap<String, HashSet<String>> = HashMap::new();
        for nodes in prepared {
            for row in &nodes.rows {
                for (field, value) in row {
                    let property = if field == ID_FIELD {
                        ID_PROPERTY
                    } else if nodes.fields.contains(field) {
                        field.as_str()
                    } else {
                        continue;
                    };
                    values
                        .entry(property.to_string())
                        .or_default()
                        .insert(value.to_string());
                }
            }
        }
        Self { values }
    }

    fn contains(&self, property: &str, value: &Value) -> bool {
        self.values
            .get(property)
            .map_or(false, |set| set.contains(&value.to_string()))
    }

    fn dangling(&self, batches: &[EdgeBatch]) -> Vec<DanglingEndpoint> {
        let mut seen = HashSet::new();
        let mut dangling = Vec::new();
        for batch in batches {
            let (from_property, to_property) = batch.endpoints.properties();
            for edge in &batch.edges {
                for (property, value) in [(from_property, &edge.from), (to_property, &edge.to)] {
                    if !self.contains(property, value)
                        && seen.insert((batch.label.clone(), property.to_string(), value.to_string()))
                    {
                        dangling.push(DanglingEndpoint {
                            edge_label: batch.label.clone(),
                            property: property.to_string(),
                            value: value.clone(),
                        });
                    }
                }
            }
        }
        dangling
    }
}

pub struct SbomWriter {
    batches: BatchWriter,
    metrics: Arc<dyn MetricsSink>,
    strict: bool,
    cyclonedx: CycloneDxAdapter,
    spdx: SpdxAdapter,
}

impl SbomWriter {
    pub fn new(executor: Arc<dyn GraphQueryExecutor>, config: BatchConfig) -> Self {
        Self {
            batches: BatchWriter::new(executor, config),
            metrics: Arc::new(NoopMetrics),
            strict: false,
            cyclonedx: CycloneDxAdapter,
            spdx: SpdxAdapter,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Strict mode fails a document on any failed chunk or dangling endpoint.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn adapter_for(&self, format: SbomFormat) -> Option<&dyn SbomAdapter> {
        match format {
            SbomFormat::CycloneDx => Some(&self.cyclonedx),
            SbomFormat::Spdx => Some(&self.spdx),
            SbomFormat::Unknown => None,
        }
    }

    pub async fn write_document(&self, document: &Value) -> IngestResult<DocumentReport> {
        let format = SbomFormat::detect(document);
        let Some(adapter) = self.adapter_for(format) else {
            warn!("⚠️  Skipping document: neither 'bomFormat' nor 'spdxVersion' present");
            return Err(IngestError::UnrecognizedFormat);
        };

        let ctx = DocumentContext::fresh();
        info!("📝 Writing {} document as {}", format, ctx.document_id);
        let operation = format!("write_document:{}", format);
        instrumented(&*self.metrics, &operation, self.write_with(adapter, document, &ctx)).await
    }

    pub async fn write_with(
        &self,
        adapter: &dyn SbomAdapter,
        document: &Value,
        ctx: &DocumentContext,
    ) -> IngestResult<DocumentReport> {
        let root = document
            .as_object()
            .ok_or_else(|| IngestError::InvalidDocument("document root must be an object".to_string()))?;

        let node_batches = adapter.node_batches(root, ctx)?;
        let edge_batches = adapter.edge_batches(root, ctx)?;

        // Identity errors must surface before anything reaches the store.
        let prepared = node_batches
            .iter()
            .map(|batch| {
                self.batches.prepare_nodes(
                    &batch.records,
                    &batch.label,
                    batch.key_field.as_deref(),
                    &batch.identity,
                )
            })
            .collect::<IngestResult<Vec<_>>>()?;

        let dangling = EndpointIndex::from_prepared(&prepared).dangling(&edge_batches);
        if !dangling.is_empty() {
            warn!(
                "⚠️  {} edge endpoint(s) are not written by this document and may not match",
                dangling.len()
            );
            for endpoint in &dangling {
                debug!("   dangling endpoint {}", endpoint);
            }
            if self.strict {
                return Err(IngestError::DanglingEndpoints(dangling));
            }
        }

        let mut report = DocumentReport {
            document_id: ctx.document_id.clone(),
            format: adapter.format(),
            node_batches: Vec::with_capacity(prepared.len()),
            edge_batches: Vec::with_capacity(edge_batches.len()),
            dangling_endpoints: dangling.len(),
        };

        for nodes in &prepared {
            let operation = format!("upsert_nodes:{}", nodes.label);
            let batch_report = instrumented(&*self.metrics, &operation, self.batches.submit_nodes(nodes)).await;
            report.node_batches.push(batch_report);
        }

        for edges in &edge_batches {
            let operation = format!("upsert_edges:{}", edges.label);
            let batch_report = instrumented(&*self.metrics, &operation, self.batches.upsert_edges(edges)).await;
            report.edge_batches.push(batch_report);
        }

        let failures = report.failures();
        if failures.is_empty() {
            info!(
                "✅ Document {} written ({} nodes, {} edges)",
                report.document_id,
                report.nodes_committed(),
                report.edges_committed()
            );
        } else {
            error!(
                "❌ Document {} written with {} failed chunk(s)",
                report.document_id,
                failures.len()
            );
            if self.strict {
                return Err(IngestError::ChunkFailures(failures));
            }
        }

        Ok(report)
    }
}
