//! Stub providers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use retrieval_core::{
    CompletionRequest, CompletionService, EmbeddingProvider, Result, RetrievalError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Embeds from a fixed text -> vector table; unknown text is a service error
pub struct LookupEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl LookupEmbedder {
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, Vec<f32>)>) -> Self {
        let table: HashMap<String, Vec<f32>> = pairs
            .into_iter()
            .map(|(text, vector)| (text.to_string(), vector))
            .collect();
        let dimension = table.values().next().map(Vec::len).unwrap_or_default();
        Self {
            dimension,
            table,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering, so concurrent callers interleave
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for LookupEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        texts
            .iter()
            .map(|text| {
                self.table.get(text).cloned().ok_or_else(|| {
                    RetrievalError::EmbeddingService(format!("no stub vector for {:?}", text))
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "lookup-stub"
    }
}

/// The three-passage scenario: [1,0], [0,1], [1,1]
pub fn scenario_embedder() -> LookupEmbedder {
    LookupEmbedder::new([
        ("MAGNETS attract iron", vec![1.0, 0.0]),
        ("LIGHT travels in straight lines", vec![0.0, 1.0]),
        ("MAGNETIC LIGHT is not a thing", vec![1.0, 1.0]),
        ("magnets", vec![1.0, 0.0]),
        ("light", vec![0.0, 1.0]),
        ("Give me an overview of the topic Magnets", vec![1.0, 0.0]),
    ])
}

pub const SCENARIO_SOURCE: &str = "MAGNETS\nattract iron\n\nLIGHT\ntravels in straight lines\nMAGNETIC LIGHT\nis not a thing\n";

/// Always fails, as an unreachable service would
pub struct DownEmbedder;

#[async_trait]
impl EmbeddingProvider for DownEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RetrievalError::EmbeddingService("connection refused".to_string()))
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_id(&self) -> &str {
        "down"
    }
}

/// Returns a canned reply and records prompts
pub struct CannedCompletion {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl CannedCompletion {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionService for CannedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        Ok(self.reply.clone())
    }

    fn model_id(&self) -> &str {
        "canned"
    }
}
