//! Retrieval Core - semantic retrieval engine for the EduGen tutor
//!
//! This crate provides:
//! - Corpus segmentation into passages
//! - Embedding providers (local Candle encoder, remote OpenAI-compatible API)
//! - Exact vector index with a checksummed on-disk bundle
//! - Offline index builder and online retriever
//! - Prompt assembly, completion client and answer grading
//! - Configuration management

pub mod builder;
pub mod completion;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod evaluation;
pub mod index;
pub mod prompt;
pub mod retriever;
pub mod storage;
pub mod tutor;

// Re-export commonly used types
pub use builder::{BuildSummary, IndexBuilder};
pub use completion::{CompletionRequest, CompletionService, OpenAiCompletion};
pub use config::{ProviderKind, TutorConfig};
pub use corpus::{Corpus, Passage};
pub use embeddings::{provider_from_config, EmbeddingProvider, LocalEncoder, RemoteEmbedder};
pub use error::{Result, RetrievalError};
pub use evaluation::{decode_evaluation, Evaluation};
pub use index::{validate_k, IndexStats, Neighbor, VectorIndex};
pub use prompt::{GenerationParams, PromptAssembler, PromptMode, PromptTemplate};
pub use retriever::{QueryRequest, RetrievalResult, Retriever};
pub use storage::{BuildLock, IndexBundle};
pub use tutor::{Tutor, TutorReply};
