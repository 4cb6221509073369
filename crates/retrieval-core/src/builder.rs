//! Offline build pipeline: source document to persisted bundle
//!
//! ```text
//! load_source -> Corpus::segment -> embed (batched) -> VectorIndex::build
//!             -> IndexBundle::save_locked
//! ```

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::corpus::Corpus;
use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, RetrievalError};
use crate::index::VectorIndex;
use crate::storage::{BuildLock, IndexBundle};

/// What a completed build wrote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSummary {
    pub out_dir: PathBuf,
    pub passages: usize,
    pub dimension: usize,
    pub model: String,
}

/// Builds an index bundle with an injected embedding provider
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Read a source document as text. PDFs go through text extraction,
    /// everything else is read as UTF-8.
    pub fn load_source(path: &Path) -> Result<String> {
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            let text = pdf_extract::extract_text(path).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("text extraction failed for {}: {}", path.display(), e),
                )
            })?;
            tracing::info!("Extracted {} chars from {}", text.len(), path.display());
            Ok(text)
        } else {
            Ok(fs::read_to_string(path)?)
        }
    }

    /// Embed every passage, `batch_size` texts per provider call, in order
    pub async fn embed_corpus(&self, corpus: &Corpus) -> Result<Vec<Vec<f32>>> {
        let texts = corpus.texts();
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, chunk) in texts.chunks(self.batch_size).enumerate() {
            let batch = self.embedder.embed(chunk).await?;
            if batch.len() != chunk.len() {
                return Err(RetrievalError::EmbeddingService(format!(
                    "batch {} returned {} vectors for {} passages",
                    i,
                    batch.len(),
                    chunk.len()
                )));
            }
            vectors.extend(batch);
            tracing::debug!("Embedded {}/{} passages", vectors.len(), texts.len());
        }

        Ok(vectors)
    }

    /// Segment `raw`, embed the passages and build the in-memory bundle
    pub async fn build_from_text(&self, raw: &str) -> Result<IndexBundle> {
        let corpus = Corpus::segment(raw);
        if corpus.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }
        tracing::info!("Segmented source into {} passages", corpus.len());

        let vectors = self.embed_corpus(&corpus).await?;
        let index = VectorIndex::build(&vectors)?;
        IndexBundle::new(corpus, index, self.embedder.model_id())
    }

    /// Build a bundle from `source` and persist it into `out_dir`.
    ///
    /// The directory lock is held for the whole build, so a concurrent build
    /// on the same directory fails fast with `ArtifactLocked`.
    pub async fn build_from_file(&self, source: &Path, out_dir: &Path) -> Result<BuildSummary> {
        let lock = BuildLock::acquire(out_dir)?;
        tracing::info!(
            "Building index from {} into {}",
            source.display(),
            out_dir.display()
        );

        let raw = Self::load_source(source)?;
        let bundle = self.build_from_text(&raw).await?;
        bundle.save_locked(&lock)?;

        Ok(BuildSummary {
            out_dir: out_dir.to_path_buf(),
            passages: bundle.corpus.len(),
            dimension: bundle.index.dimension(),
            model: bundle.model,
        })
    }
}
