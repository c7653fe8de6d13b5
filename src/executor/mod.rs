//! Graph Query Executor
//!
//! The only place a query leaves the process. Everything above this seam
//! works against the trait so tests can substitute a recording fake.

pub mod http;
pub mod neo4j;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use self::http::HttpQueryExecutor;
pub use self::neo4j::Neo4jExecutor;

#[async_trait]
pub trait GraphQueryExecutor: Send + Sync {
    /// Runs `query` with `parameters` bound, e.g. `{"props": [...]}`.
    ///
    /// `Ok` means the store accepted the request; returned rows are ignored.
    async fn execute(&self, query: &str, parameters: &Value) -> Result<()>;
}
