//! HTTP request handlers for the tutor API
//!
//! Provides handlers for:
//! - Health checks
//! - Passage retrieval
//! - Tutor chat (topic overview or question answering)
//! - Answer grading

use axum::{extract::State, Json};
use retrieval_core::{validate_k, PromptMode, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub top_k: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub total_matches: usize,
    pub results: Vec<RetrievalResult>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub topic: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, alias = "isInitialOverview")]
    pub is_initial_overview: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub topic: String,
    pub mode: PromptMode,
    /// The student's message, or the greeting that stands in for it on an overview
    pub prompt: String,
    pub response: String,
    pub passages: Vec<RetrievalResult>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub question: String,
    #[serde(alias = "modelAnswer")]
    pub model_answer: String,
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub score: f64,
    pub percentage: f64,
    pub is_correct: bool,
    pub feedback: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub passages: usize,
    pub dimension: usize,
    pub embedding_model: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let retriever = state.tutor.retriever();
    Json(HealthResponse {
        status: "ok".to_string(),
        passages: retriever.corpus().len(),
        dimension: retriever.index().dimension(),
        embedding_model: retriever.embedder().model_id().to_string(),
    })
}

/// Ranked passages for a free-text query
pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::InvalidRequest("query must not be empty".into()));
    }
    let top_k = match request.top_k {
        Some(k) => validate_k(k)?,
        None => state.default_top_k,
    };
    info!("Retrieve: top_k={}", top_k);

    let results = state.tutor.retriever().retrieve(&request.query, top_k).await?;

    Ok(Json(RetrieveResponse {
        query: request.query,
        total_matches: results.len(),
        results,
    }))
}

/// Tutor chat: an overview of the topic, or an answer to the student's prompt
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.topic.trim().is_empty() {
        return Err(ApiError::InvalidRequest("topic is required".into()));
    }

    let (mode, prompt, reply) = if request.is_initial_overview {
        info!("Chat: overview of '{}'", request.topic);
        let reply = state.tutor.overview(&request.topic).await?;
        let greeting = format!(
            "Hi, this is my first lesson and I'm excited to be here. Give me an overview of {}",
            request.topic
        );
        (PromptMode::Overview, greeting, reply)
    } else {
        if request.prompt.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "prompt is required for non-overview messages".into(),
            ));
        }
        info!("Chat: question about '{}'", request.topic);
        let reply = state
            .tutor
            .answer(&request.prompt, Some(&request.topic))
            .await?;
        (PromptMode::Qa, request.prompt, reply)
    };

    Ok(Json(ChatResponse {
        topic: request.topic,
        mode,
        prompt,
        response: reply.text,
        passages: reply.passages,
    }))
}

/// Grade a student's answer against the model answer
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    if request.question.trim().is_empty() || request.answer.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "question and answer are required".into(),
        ));
    }

    let evaluation = state
        .tutor
        .evaluate(&request.question, &request.model_answer, &request.answer)
        .await?;

    Ok(Json(EvaluateResponse {
        score: evaluation.score,
        percentage: evaluation.percentage(),
        is_correct: evaluation.is_correct(),
        feedback: evaluation.feedback,
    }))
}
