//! Application state for the tutor API
//!
//! The bundle is loaded and both service clients are built once at startup;
//! handlers only read from the state.

use anyhow::{Context, Result};
use retrieval_core::{
    provider_from_config, IndexBundle, OpenAiCompletion, Retriever, Tutor, TutorConfig,
};
use std::sync::Arc;
use tracing::info;

/// Shared application state
pub struct AppState {
    pub tutor: Tutor,
    /// Passages retrieved when a request does not say
    pub default_top_k: usize,
}

impl AppState {
    pub fn new(tutor: Tutor, default_top_k: usize) -> Self {
        Self {
            tutor,
            default_top_k,
        }
    }

    /// Load the index bundle and connect providers.
    ///
    /// Fails (and so aborts startup) if the persisted artifacts are missing,
    /// corrupt or out of sync.
    pub async fn from_config(config: &TutorConfig) -> Result<Self> {
        let dir = config.retrieval.artifacts_dir.clone();
        info!("Loading index bundle from {}", dir.display());
        let bundle = tokio::task::spawn_blocking(move || IndexBundle::load(&dir))
            .await?
            .context("failed to load index bundle")?;

        info!(
            "Connecting {:?} embedding provider ({})",
            config.embedding.provider, config.embedding.model
        );
        let embedder = provider_from_config(&config.embedding)
            .await
            .context("failed to initialise embedding provider")?;

        let retriever = Retriever::from_bundle(
            bundle,
            embedder,
            config.retrieval.allow_model_mismatch,
        )?;
        let completion = Arc::new(OpenAiCompletion::from_config(&config.completion)?);
        info!(
            "Tutor ready: {} passages, completion model {}",
            retriever.corpus().len(),
            config.completion.model
        );

        let tutor = Tutor::new(retriever, completion, config.retrieval.top_k);
        Ok(Self::new(tutor, config.retrieval.top_k))
    }
}
