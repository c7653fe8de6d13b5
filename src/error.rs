use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Record is missing identity key '{key}' for label '{label}': {record}")]
    MissingIdentityKey {
        label: String,
        key: String,
        record: Value,
    },

    #[error("Unrecognized SBOM format: document has neither 'bomFormat' nor 'spdxVersion'")]
    UnrecognizedFormat,

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("{} chunk(s) failed: {}", .0.len(), join_display(.0))]
    ChunkFailures(Vec<ChunkFailure>),

    #[error("{} edge endpoint(s) reference nodes not written by this document: {}", .0.len(), join_display(.0))]
    DanglingEndpoints(Vec<DanglingEndpoint>),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// A chunk that still failed after every retry attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub label: String,
    pub chunk_index: usize,
    pub attempts: u32,
    pub reason: String,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[chunk {}] after {} attempt(s): {}",
            self.label, self.chunk_index, self.attempts, self.reason
        )
    }
}

/// An edge endpoint that no node batch of the same document produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DanglingEndpoint {
    pub edge_label: String,
    pub property: String,
    pub value: Value,
}

impl fmt::Display for DanglingEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {{{}: {}}}", self.edge_label, self.property, self.value)
    }
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
