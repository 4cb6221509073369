//! Text-to-vector encoders
//!
//! The retrieval engine only talks to [`EmbeddingProvider`]. Two
//! implementations ship with the crate:
//! - [`LocalEncoder`]: BERT-family sentence encoder run with Candle
//! - [`RemoteEmbedder`]: OpenAI-compatible `/embeddings` HTTP endpoint
//!
//! Providers are built once at startup from configuration and passed to the
//! builder/retriever explicitly.

pub mod local;
pub mod remote;

pub use local::LocalEncoder;
pub use remote::RemoteEmbedder;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::{Result, RetrievalError};

/// A fixed-dimension text encoder
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encode `texts` into vectors, one per input, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimension of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Identifier of the underlying model
    fn model_id(&self) -> &str;
}

/// Construct the provider selected by `config`
pub async fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        ProviderKind::Local => {
            let encoder = LocalEncoder::from_config(config)
                .await
                .map_err(|e| RetrievalError::EmbeddingService(format!("{:#}", e)))?;
            Ok(Arc::new(encoder))
        }
        ProviderKind::Remote => Ok(Arc::new(RemoteEmbedder::from_config(config).await?)),
    }
}

/// Check a provider reply against the request it answered
pub(crate) fn check_batch(
    inputs: usize,
    vectors: &[Vec<f32>],
    dimension: Option<usize>,
) -> Result<()> {
    if vectors.len() != inputs {
        return Err(RetrievalError::EmbeddingService(format!(
            "provider returned {} vectors for {} inputs",
            vectors.len(),
            inputs
        )));
    }
    if let Some(expected) = dimension {
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RetrievalError::EmbeddingService(format!(
                "provider returned a {}-dimensional vector, expected {}",
                bad.len(),
                expected
            )));
        }
    }
    Ok(())
}
