//! Completion-service boundary
//!
//! The engine hands an assembled prompt to a [`CompletionService`] and gets
//! generated text back. [`OpenAiCompletion`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{api_key, CompletionConfig};
use crate::error::{Result, RetrievalError};
use crate::prompt::GenerationParams;

/// One prompt plus its sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default)]
    pub params: GenerationParams,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            params,
        }
    }
}

/// Text generation backend
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    fn model_id(&self) -> &str;
}

/// Chat-completions client; the whole prompt is sent as one user message
pub struct OpenAiCompletion {
    client: Client,
    url: String,
    model: String,
}

impl OpenAiCompletion {
    pub fn from_config(config: &CompletionConfig) -> Result<Self> {
        Self::new(
            &config.endpoint,
            &config.model,
            api_key(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth = HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                .map_err(|_| RetrievalError::Config("invalid API key".into()))?;
            headers.insert(AUTHORIZATION, auth);
        } else {
            tracing::warn!("No API key set; completion requests are sent unauthenticated");
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RetrievalError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", endpoint.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
        };

        tracing::debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.model,
            request.prompt.len()
        );

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::Completion(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Completion(format!(
                "completion request failed ({}): {}",
                status, detail
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Completion(format!("unreadable completion: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RetrievalError::Completion("completion returned no content".to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}
