//! Error taxonomy for the retrieval engine
//!
//! Every failure mode is a distinct variant so callers can tell a caller bug
//! (`DimensionMismatch`, `InvalidK`) from an operational problem
//! (`CorpusIndexMismatch`, `CorruptArtifact`) or a transient outage of an
//! external service (`EmbeddingService`, `Completion`).

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by corpus construction, indexing, retrieval and generation
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A vector does not have the dimension of the index it is used with
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Requested number of neighbours is not positive
    #[error("Invalid top-k: {0} (must be greater than zero)")]
    InvalidK(i64),

    /// An index was built or queried with zero vectors
    #[error("Corpus is empty: an index needs at least one passage")]
    EmptyCorpus,

    /// The persisted index and corpus were not built together
    #[error("Index holds {index} vectors but corpus holds {corpus} passages")]
    CorpusIndexMismatch { index: usize, corpus: usize },

    /// The index was built with a different embedding model than the one
    /// configured for queries
    #[error("Index was built with model {index} but queries would use {embedder}")]
    ModelMismatch { index: String, embedder: String },

    /// The embedding provider failed (timeout, quota, malformed input)
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    /// The completion service failed
    #[error("Completion service error: {0}")]
    Completion(String),

    /// A completion reply could not be decoded into structured data
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A persisted artifact has a bad header, checksum or payload
    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    /// Another build currently holds the output directory; the path is the
    /// lock file
    #[error(
        "Artifact directory is locked by another build; delete {} if no build is running",
        .0.display()
    )]
    ArtifactLocked(PathBuf),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Whether the caller may retry the operation (with backoff)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RetrievalError::EmbeddingService(_) | RetrievalError::Completion(_)
        )
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, RetrievalError>;
