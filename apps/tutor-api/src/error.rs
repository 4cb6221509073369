//! Error types for the tutor API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use retrieval_core::RetrievalError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
    retryable: bool,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Retrieval(err) => match err {
                RetrievalError::DimensionMismatch { .. } => {
                    (StatusCode::BAD_REQUEST, "DIMENSION_MISMATCH")
                }
                RetrievalError::InvalidK(_) => (StatusCode::BAD_REQUEST, "INVALID_TOP_K"),
                RetrievalError::EmbeddingService(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "EMBEDDING_UNAVAILABLE")
                }
                RetrievalError::Completion(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "COMPLETION_UNAVAILABLE")
                }
                RetrievalError::MalformedResponse(_) => {
                    (StatusCode::BAD_GATEWAY, "MALFORMED_RESPONSE")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }

    fn retryable(&self) -> bool {
        match self {
            ApiError::Retrieval(err) => err.is_retryable(),
            ApiError::InvalidRequest(_) => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("{} ({})", self, code);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
            retryable: self.retryable(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST, false),
            (RetrievalError::InvalidK(0).into(), StatusCode::BAD_REQUEST, false),
            (
                RetrievalError::DimensionMismatch { expected: 3, actual: 2 }.into(),
                StatusCode::BAD_REQUEST,
                false,
            ),
            (
                RetrievalError::EmbeddingService("down".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (
                RetrievalError::Completion("quota".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (
                RetrievalError::MalformedResponse("prose".into()).into(),
                StatusCode::BAD_GATEWAY,
                false,
            ),
            (RetrievalError::EmptyCorpus.into(), StatusCode::INTERNAL_SERVER_ERROR, false),
        ];

        for (err, status, retryable) in cases {
            let err: ApiError = err;
            assert_eq!(err.status_and_code().0, status, "{}", err);
            assert_eq!(err.retryable(), retryable, "{}", err);
        }
    }
}
