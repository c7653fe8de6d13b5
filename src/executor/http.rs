//! openCypher over HTTP
//!
//! Posts `query` and `parameters` as a form to `{base_url}/openCypher`, the
//! shape accepted by Neptune-style openCypher endpoints. Request signing is
//! left to a proxy in front of the endpoint.

use super::GraphQueryExecutor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

pub struct HttpQueryExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQueryExecutor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/openCypher", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GraphQueryExecutor for HttpQueryExecutor {
    async fn execute(&self, query: &str, parameters: &Value) -> Result<()> {
        let url = self.endpoint();
        let encoded = serde_json::to_string(parameters).context("Failed to encode query parameters")?;

        debug!("POST {} ({} bytes of parameters)", url, encoded.len());
        let response = self
            .client
            .post(&url)
            .form(&[("query", query), ("parameters", encoded.as_str())])
            .send()
            .await
            .context("Failed to send openCypher request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("openCypher request failed with {}: {}", status, error_text);
            return Err(anyhow::anyhow!("openCypher error {}: {}", status.as_u16(), error_text));
        }

        Ok(())
    }
}
