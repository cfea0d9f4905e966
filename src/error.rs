use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Embedding provider failure. Always retryable from the caller's point of
/// view: no partial vectors are ever produced.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingProviderError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("embedding API returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("embedding response malformed: {0}")]
    Malformed(String),
}

/// Errors surfaced at the HTTP boundary.
///
/// Hard failures only — soft failures (Semantic Scholar, malformed stream
/// chunks, enrichment misses) are absorbed with a `warn!` and never reach
/// this type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingProviderError),
    /// Both the hybrid and the legacy vector search path failed.
    #[error("search failed: {0}")]
    Search(String),
    #[error("chat completion failed: {0}")]
    Completion(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Embedding(_) | Self::Completion(_) => StatusCode::BAD_GATEWAY,
            Self::Search(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
