use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors raised by the Spotify client core.
#[derive(Debug, thiserror::Error)]
pub enum SpotifyError {
    /// Client credentials are not configured. Never carries the values.
    #[error("{0}")]
    Configuration(String),
    /// Caller-supplied query was empty or otherwise unusable.
    #[error("{0}")]
    InvalidQuery(String),
    /// Every token acquisition attempt failed; wraps the last failure.
    #[error("all token attempts failed: {0}")]
    TokenAcquisition(String),
    /// Both catalog sub-requests failed outright.
    #[error("search failed: {0}")]
    SearchFailed(String),
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    Spotify(String),
    BadRequest(String),
    Internal(String),
}

impl From<SpotifyError> for AppError {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::InvalidQuery(msg) => AppError::BadRequest(msg),
            SpotifyError::Configuration(msg) => AppError::Internal(msg),
            other => AppError::Spotify(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Spotify(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (
            status,
            Json(json!({ "error": message })),
        )
            .into_response()
    }
}
