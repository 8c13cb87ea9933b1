//! HTTP error type. Handlers return `Result<T, ApiError>`; internal failures
//! are logged in full and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rag_chat::RagError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Rag(#[from] RagError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Rag(RagError::InvalidInput(m)) | ApiError::Rag(RagError::Pdf(m)) => {
                (StatusCode::BAD_REQUEST, m)
            }
            ApiError::Rag(e) => {
                log::error!("Request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(RagError::InvalidInput("empty".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(RagError::Pdf("broken".into()).into()), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ApiError::NotFound("s".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(RagError::Connection("db down".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
