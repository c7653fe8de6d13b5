use crate::batch_writer::BatchConfig;
use crate::error::{IngestError, IngestResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphBackend {
    Neo4j,
    /// openCypher HTTP endpoint (Neptune-compatible)
    Http,
}

impl FromStr for GraphBackend {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neo4j" | "bolt" => Ok(GraphBackend::Neo4j),
            "http" | "opencypher" | "neptune" => Ok(GraphBackend::Http),
            other => Err(IngestError::Config(format!("unknown GRAPH_BACKEND '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: GraphBackend,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub opencypher_url: String,
    pub connect_retries: u32,
    pub strict: bool,
    pub batch: BatchConfig,
}

impl Config {
    pub fn from_env() -> IngestResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let defaults = BatchConfig::default();

        let batch = BatchConfig {
            batch_size: parse(&lookup, "BATCH_SIZE", defaults.batch_size)?,
            max_concurrency: parse(&lookup, "MAX_CONCURRENCY", defaults.max_concurrency)?,
            chunk_timeout: Duration::from_secs(parse(
                &lookup,
                "CHUNK_TIMEOUT_SECS",
                defaults.chunk_timeout.as_secs(),
            )?),
            max_retries: parse(&lookup, "MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(parse(
                &lookup,
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
        };

        if batch.batch_size == 0 {
            return Err(IngestError::Config("BATCH_SIZE must be at least 1".to_string()));
        }
        if batch.max_concurrency == 0 {
            return Err(IngestError::Config("MAX_CONCURRENCY must be at least 1".to_string()));
        }
        if batch.max_retries == 0 {
            return Err(IngestError::Config("MAX_RETRIES must be at least 1".to_string()));
        }

        Ok(Config {
            backend: string("GRAPH_BACKEND", "neo4j").parse()?,
            neo4j_uri: string("NEO4J_URI", "bolt://localhost:7687"),
            neo4j_user: string("NEO4J_USER", "neo4j"),
            neo4j_password: string("NEO4J_PASSWORD", "password"),
            opencypher_url: string("OPENCYPHER_URL", "http://localhost:8182"),
            connect_retries: parse(&lookup, "CONNECT_RETRIES", 4)?,
            strict: parse(&lookup, "STRICT_MODE", false)?,
            batch,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> IngestResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IngestError::Config(format!("invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.backend, GraphBackend::Neo4j);
        assert_eq!(config.neo4j_uri, "bolt://localhost:7687");
        assert_eq!(config.batch.batch_size, 200);
        assert_eq!(config.batch.max_concurrency, 1);
        assert_eq!(config.batch.chunk_timeout, Duration::from_secs(30));
        assert_eq!(config.batch.max_retries, 3);
        assert!(!config.strict);
        assert_eq!(config.connect_retries, 4);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("GRAPH_BACKEND", "Neptune"),
            ("OPENCYPHER_URL", "https://graph.internal:8182"),
            ("BATCH_SIZE", "50"),
            ("MAX_CONCURRENCY", "4"),
            ("RETRY_BASE_DELAY_MS", "10"),
            ("STRICT_MODE", "true"),
        ]))
        .unwrap();

        assert_eq!(config.backend, GraphBackend::Http);
        assert_eq!(config.opencypher_url, "https://graph.internal:8182");
        assert_eq!(config.batch.batch_size, 50);
        assert_eq!(config.batch.max_concurrency, 4);
        assert_eq!(config.batch.retry_base_delay, Duration::from_millis(10));
        assert!(config.strict);
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = Config::from_lookup(lookup_from(&[("BATCH_SIZE", "lots")])).unwrap_err();

        assert!(matches!(err, IngestError::Config(msg) if msg.contains("BATCH_SIZE")));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = Config::from_lookup(lookup_from(&[("BATCH_SIZE", "0")])).unwrap_err();

        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = Config::from_lookup(lookup_from(&[("GRAPH_BACKEND", "gremlin")])).unwrap_err();

        assert!(matches!(err, IngestError::Config(msg) if msg.contains("gremlin")));
    }
}
