//! SBOM Ingestion
//!
//! Projects CycloneDX and SPDX documents into a property graph through
//! chunked, deduplicated, idempotent upsert queries.

pub mod adapters;
pub mod batch_writer;
pub mod config;
pub mod error;
pub mod executor;
pub mod format;
pub mod identity;
pub mod metrics;
pub mod retry;
pub mod sanitizer;
pub mod writer;

pub use batch_writer::{BatchConfig, BatchReport, BatchWriter, EdgeBatch, EdgeRow, NodeBatch};
pub use error::{IngestError, IngestResult};
pub use executor::GraphQueryExecutor;
pub use format::SbomFormat;
pub use writer::{DocumentReport, SbomWriter};

#[cfg(test)]
pub(crate) mod testing;
