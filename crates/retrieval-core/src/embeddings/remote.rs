//! OpenAI-compatible embeddings client

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{check_batch, EmbeddingProvider};
use crate::config::{api_key, EmbeddingConfig};
use crate::error::{Result, RetrievalError};

/// Embeddings client for `POST {endpoint}/embeddings`.
///
/// Failures are reported as `EmbeddingService` and never retried here; the
/// hosting service owns the retry policy.
pub struct RemoteEmbedder {
    client: Client,
    url: String,
    model: String,
    requested_dimensions: Option<usize>,
    dimension: usize,
}

impl RemoteEmbedder {
    /// Build a client from configuration.
    ///
    /// When `dimensions` is not configured, one probe request is made to learn
    /// the model's output dimension.
    pub async fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| {
            RetrievalError::Config("embedding.endpoint is required for the remote provider".into())
        })?;
        let mut embedder = Self::new(
            endpoint,
            &config.model,
            api_key(),
            config.dimensions,
            Duration::from_secs(config.timeout_secs),
        )?;

        if config.dimensions.is_none() {
            let probe = embedder.request(&["dimension probe".to_string()]).await?;
            embedder.dimension = probe.first().map(Vec::len).unwrap_or_default();
            if embedder.dimension == 0 {
                return Err(RetrievalError::EmbeddingService(
                    "provider returned an empty probe embedding".to_string(),
                ));
            }
        }

        tracing::info!(
            "Remote embedder ready: model={}, dimension={}",
            embedder.model,
            embedder.dimension
        );
        Ok(embedder)
    }

    /// Build a client with a known output dimension
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(RetrievalError::Config("missing embedding model name".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth = HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                .map_err(|_| RetrievalError::Config("invalid API key".into()))?;
            headers.insert(AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RetrievalError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", endpoint.trim_end_matches('/')),
            model: model.to_string(),
            requested_dimensions: dimensions,
            dimension: dimensions.unwrap_or_default(),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::EmbeddingService(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RetrievalError::EmbeddingService(format!(
                "embeddings request failed ({}): {}",
                status, detail
            )));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            RetrievalError::EmbeddingService(format!("unreadable embeddings response: {}", e))
        })?;
        parsed.data.sort_by_key(|row| row.index);

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|row| row.embedding).collect();
        check_batch(texts.len(), &vectors, None)?;
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!("Embedding {} texts via {}", texts.len(), self.url);
        let vectors = self.request(texts).await?;
        check_batch(texts.len(), &vectors, Some(self.dimension))?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
    index: usize,
}
