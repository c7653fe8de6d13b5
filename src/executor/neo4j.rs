//! Neo4j executor
//!
//! Binds JSON parameters as Bolt values and runs the query on a pooled
//! `neo4rs::Graph`.

use super::GraphQueryExecutor;
use crate::retry::backoff_delay;
use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{query, BoltType, Graph};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const CONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

pub struct Neo4jExecutor {
    graph: Graph,
}

impl Neo4jExecutor {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    /// Opens the connection pool, retrying with exponential backoff.
    ///
    /// `max_attempts` counts every try, the first included.
    pub async fn connect_with_retry(
        uri: &str,
        user: &str,
        password: &str,
        max_attempts: u32,
    ) -> Result<Self> {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!("🔄 Connecting to Neo4j at {} (attempt {}/{})", uri, attempt, max_attempts);

            match Graph::new(uri, user, password).await {
                Ok(graph) => {
                    info!("✅ Connected to Neo4j");
                    return Ok(Self::new(graph));
                }
                Err(e) if attempt < max_attempts => {
                    let wait = backoff_delay(CONNECT_BASE_DELAY, attempt);
                    warn!("⚠️  Neo4j unavailable: {}. Retrying in {:?}...", e, wait);
                    sleep(wait).await;
                }
                Err(e) => {
                    error!("❌ Giving up on Neo4j after {} attempt(s): {}", attempt, e);
                    return Err(anyhow::Error::new(e)
                        .context(format!("Neo4j connection failed after {} attempt(s)", attempt)));
                }
            }
        }
    }
}

#[async_trait]
impl GraphQueryExecutor for Neo4jExecutor {
    async fn execute(&self, text: &str, parameters: &Value) -> Result<()> {
        let params = parameters
            .as_object()
            .context("Query parameters must be a JSON object")?;

        let mut q = query(text);
        for (name, value) in params {
            q = q.param(name, json_to_bolt(value)?);
        }

        debug!("Running query with {} parameter(s)", params.len());
        self.graph.run(q).await.context("Neo4j rejected the query")?;
        Ok(())
    }
}

pub(crate) fn json_to_bolt(value: &Value) -> Result<BoltType> {
    let bolt = match value {
        Value::Null => BoltType::Null(neo4rs::BoltNull),
        Value::Bool(b) => BoltType::Boolean(neo4rs::BoltBoolean::new(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::Integer(neo4rs::BoltInteger::new(i))
            } else if let Some(f) = n.as_f64() {
                BoltType::Float(neo4rs::BoltFloat::new(f))
            } else {
                anyhow::bail!("Unsupported JSON number: {}", n)
            }
        }
        Value::String(s) => BoltType::String(neo4rs::BoltString::new(s)),
        Value::Array(items) => BoltType::List(neo4rs::BoltList {
            value: items.iter().map(json_to_bolt).collect::<Result<_>>()?,
        }),
        Value::Object(map) => BoltType::Map(neo4rs::BoltMap {
            value: map
                .iter()
                .map(|(k, v)| Ok((neo4rs::BoltString::new(k), json_to_bolt(v)?)))
                .collect::<Result<_>>()?,
        }),
    };
    Ok(bolt)
}
