//! Configuration management for the tutor retrieval system
//!
//! Settings come from an optional TOML file, then environment variables
//! override individual fields. Service clients are built from the resulting
//! [`TutorConfig`] once at startup and injected where they are needed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, RetrievalError};

/// Default sentence encoder (384 dimensions)
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default chat model for the completion service
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

/// Environment variable holding the API key for OpenAI-compatible services
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Where embeddings are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process Candle encoder
    Local,
    /// OpenAI-compatible HTTP endpoint
    Remote,
}

impl std::str::FromStr for ProviderKind {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" | "candle" => Ok(ProviderKind::Local),
            "remote" | "openai" | "http" => Ok(ProviderKind::Remote),
            other => Err(RetrievalError::Config(format!(
                "Unknown embedding provider: {}",
                other
            ))),
        }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    /// Model identifier (hub repo for local, model name for remote)
    pub model: String,
    /// Directory with `config.json`, `tokenizer.json`, `model.safetensors`
    pub model_path: Option<PathBuf>,
    /// Base URL of the remote service, e.g. `https://api.openai.com/v1`
    pub endpoint: Option<String>,
    /// Requested output dimension (remote providers that support it)
    pub dimensions: Option<usize>,
    /// Maximum texts per embedding call
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            model_path: None,
            endpoint: None,
            dimensions: None,
            batch_size: 32,
            timeout_secs: 30,
        }
    }
}

/// Completion service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            timeout_secs: 60,
        }
    }
}

/// Retrieval settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Directory holding `index.bin` and `corpus.json`
    pub artifacts_dir: PathBuf,
    /// Passages retrieved per query
    pub top_k: usize,
    /// Serve an index built with a different embedding model than the
    /// configured one
    pub allow_model_mismatch: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("./data/index"),
            top_k: 5,
            allow_model_mismatch: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub retrieval: RetrievalSettings,
}

impl TutorConfig {
    /// Load configuration: TOML file (if given), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RetrievalError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string; missing fields take defaults
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RetrievalError::Config(format!("Invalid TOML: {}", e)))
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Recognised variables:
    /// - TUTOR_EMBEDDING_PROVIDER: "local" or "remote"
    /// - TUTOR_EMBEDDING_MODEL / TUTOR_EMBEDDING_MODEL_PATH / TUTOR_EMBEDDING_ENDPOINT
    /// - TUTOR_COMPLETION_ENDPOINT / TUTOR_COMPLETION_MODEL
    /// - TUTOR_ARTIFACTS_DIR / TUTOR_TOP_K
    /// - TUTOR_ALLOW_MODEL_MISMATCH: "true" or "false"
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("TUTOR_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Some(model) = lookup("TUTOR_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(path) = lookup("TUTOR_EMBEDDING_MODEL_PATH") {
            self.embedding.model_path = Some(PathBuf::from(path));
        }
        if let Some(endpoint) = lookup("TUTOR_EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = Some(endpoint);
        }
        if let Some(endpoint) = lookup("TUTOR_COMPLETION_ENDPOINT") {
            self.completion.endpoint = endpoint;
        }
        if let Some(model) = lookup("TUTOR_COMPLETION_MODEL") {
            self.completion.model = model;
        }
        if let Some(dir) = lookup("TUTOR_ARTIFACTS_DIR") {
            self.retrieval.artifacts_dir = PathBuf::from(dir);
        }
        if let Some(top_k) = lookup("TUTOR_TOP_K") {
            self.retrieval.top_k = top_k.parse().map_err(|_| {
                RetrievalError::Config(format!("TUTOR_TOP_K is not a number: {}", top_k))
            })?;
        }
        if let Some(allow) = lookup("TUTOR_ALLOW_MODEL_MISMATCH") {
            self.retrieval.allow_model_mismatch = allow.parse().map_err(|_| {
                RetrievalError::Config(format!(
                    "TUTOR_ALLOW_MODEL_MISMATCH must be true or false: {}",
                    allow
                ))
            })?;
        }
        Ok(())
    }

    /// Reject settings no component could run with
    pub fn validate(&self) -> Result<()> {
        if self.embedding.batch_size == 0 {
            return Err(RetrievalError::Config(
                "embedding.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(RetrievalError::Config(
                "retrieval.top_k must be greater than zero".to_string(),
            ));
        }
        if self.embedding.provider == ProviderKind::Remote && self.embedding.endpoint.is_none() {
            return Err(RetrievalError::Config(
                "embedding.endpoint is required for the remote provider".to_string(),
            ));
        }
        Ok(())
    }
}

/// API key for OpenAI-compatible services, if set
pub fn api_key() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty())
}
