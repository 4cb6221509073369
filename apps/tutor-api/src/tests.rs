//! HTTP tests for the tutor API
//!
//! The router runs against an in-memory index with stub embedding and
//! completion providers, so no model or network access is needed.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use pretty_assertions::assert_eq;
use retrieval_core::{
    CompletionRequest, CompletionService, Corpus, EmbeddingProvider, Result, RetrievalError,
    Retriever, Tutor, VectorIndex,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::handlers::{ChatResponse, EvaluateResponse, HealthResponse, RetrieveResponse};
use crate::router;
use crate::state::AppState;

// ============================================================================
// Stubs
// ============================================================================

/// "light" embeds to [0,1]; "fail" errors; everything else to [1,0]
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                if lower.contains("fail") {
                    Err(RetrievalError::EmbeddingService("stub outage".into()))
                } else if lower.contains("light") {
                    Ok(vec![0.0, 1.0])
                } else {
                    Ok(vec![1.0, 0.0])
                }
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_id(&self) -> &str {
        "keyword-stub"
    }
}

/// Grades with a fixed JSON reply, otherwise echoes the prompt length
struct StubCompletion {
    grading_reply: String,
}

#[async_trait]
impl CompletionService for StubCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if request.prompt.contains("Student's Answer:") {
            Ok(self.grading_reply.clone())
        } else {
            Ok(format!("stub reply to {} chars", request.prompt.len()))
        }
    }

    fn model_id(&self) -> &str {
        "stub"
    }
}

fn create_test_server(grading_reply: &str) -> TestServer {
    let corpus = Corpus::from_texts([
        "MAGNETS attract iron",
        "LIGHT travels in straight lines",
        "MAGNETIC LIGHT is not a thing",
    ]);
    let index =
        VectorIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();
    let retriever =
        Retriever::new(Arc::new(corpus), Arc::new(index), Arc::new(KeywordEmbedder)).unwrap();
    let completion = Arc::new(StubCompletion {
        grading_reply: grading_reply.to_string(),
    });

    let state = AppState::new(Tutor::new(retriever, completion, 2), 2);
    TestServer::new(router(Arc::new(state))).unwrap()
}

fn server() -> TestServer {
    create_test_server(r#"{"score": 0.75, "feedback": "Good start"}"#)
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_index() {
    let response = server().get("/health").await;
    response.assert_status_ok();

    let health = response.json::<HealthResponse>();
    assert_eq!(health.status, "ok");
    assert_eq!(health.passages, 3);
    assert_eq!(health.dimension, 2);
    assert_eq!(health.embedding_model, "keyword-stub");
}

// ============================================================================
// Retrieve
// ============================================================================

#[tokio::test]
async fn test_retrieve_ranks_passages() {
    let response = server()
        .post("/retrieve")
        .json(&json!({ "query": "magnets", "top_k": 2 }))
        .await;
    response.assert_status_ok();

    let body = response.json::<RetrieveResponse>();
    let ids: Vec<usize> = body.results.iter().map(|r| r.passage.id).collect();
    assert_eq!(ids, vec![0, 2]);
    assert_eq!(body.total_matches, 2);
    assert_eq!(body.results[0].score, 1.0);
}

#[tokio::test]
async fn test_retrieve_default_top_k_and_truncation() {
    let server = server();

    let body = server
        .post("/retrieve")
        .json(&json!({ "query": "light" }))
        .await
        .json::<RetrieveResponse>();
    assert_eq!(body.total_matches, 2);
    assert_eq!(body.results[0].passage.id, 1);

    let body = server
        .post("/retrieve")
        .json(&json!({ "query": "light", "top_k": 99 }))
        .await
        .json::<RetrieveResponse>();
    assert_eq!(body.total_matches, 3);
}

#[tokio::test]
async fn test_retrieve_rejects_bad_top_k() {
    let response = server()
        .post("/retrieve")
        .json(&json!({ "query": "magnets", "top_k": -3 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body = response.json::<Value>();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_TOP_K");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_embedding_outage_is_retryable_503() {
    let response = server()
        .post("/retrieve")
        .json(&json!({ "query": "please fail" }))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["retryable"], true);
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn test_chat_overview() {
    let response = server()
        .post("/chat")
        .json(&json!({ "topic": "Magnets", "isInitialOverview": true }))
        .await;
    response.assert_status_ok();

    let body = response.json::<ChatResponse>();
    assert_eq!(body.mode, retrieval_core::PromptMode::Overview);
    assert!(body.prompt.contains("overview of Magnets"));
    assert!(body.response.starts_with("stub reply"));
    assert_eq!(body.passages[0].passage.id, 0);
}

#[tokio::test]
async fn test_chat_question() {
    let response = server()
        .post("/chat")
        .json(&json!({ "topic": "Light", "prompt": "How fast is light?" }))
        .await;
    response.assert_status_ok();

    let body = response.json::<ChatResponse>();
    assert_eq!(body.mode, retrieval_core::PromptMode::Qa);
    assert_eq!(body.prompt, "How fast is light?");
    assert_eq!(body.passages[0].passage.id, 1);
}

#[tokio::test]
async fn test_chat_requires_prompt_without_overview() {
    let response = server()
        .post("/chat")
        .json(&json!({ "topic": "Light", "prompt": "  " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_REQUEST");
}

// ============================================================================
// Evaluate
// ============================================================================

#[tokio::test]
async fn test_evaluate_returns_grade() {
    let response = server()
        .post("/evaluate")
        .json(&json!({
            "question": "What do magnets attract?",
            "model_answer": "Iron and some other metals",
            "answer": "iron"
        }))
        .await;
    response.assert_status_ok();

    let body = response.json::<EvaluateResponse>();
    assert_eq!(body.score, 0.75);
    assert_eq!(body.percentage, 75.0);
    assert!(!body.is_correct);
    assert_eq!(body.feedback, "Good start");
}

#[tokio::test]
async fn test_evaluate_malformed_grade_is_502() {
    let response = create_test_server("Great job, 10/10!")
        .post("/evaluate")
        .json(&json!({ "question": "Q", "model_answer": "A", "answer": "B" }))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(response.json::<Value>()["code"], "MALFORMED_RESPONSE");
}

#[tokio::test]
async fn test_evaluate_requires_answer() {
    let response = server()
        .post("/evaluate")
        .json(&json!({ "question": "Q", "model_answer": "A", "answer": "" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}
