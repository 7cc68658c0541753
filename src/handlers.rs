//! HTTP handlers for the Spotify search API.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::spotify::{SpotifyClient, DEFAULT_LIMIT};

/// Query parameters for search endpoint.
///
/// `limit` is kept as a raw string so an unparsable value degrades to the
/// default instead of rejecting the request.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

fn effective_limit(raw: Option<&str>) -> u32 {
    raw.and_then(|l| l.trim().parse().ok()).unwrap_or(DEFAULT_LIMIT)
}

/// GET /health - Health check.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/spotify/search - Search for tracks and playlists.
pub async fn search(
    State(spotify): State<SpotifyClient>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let q = params.q.as_deref().unwrap_or("").trim().to_owned();
    if q.is_empty() {
        return Err(AppError::BadRequest(
            "query 'q' is required and cannot be empty".into(),
        ));
    }

    let limit = effective_limit(params.limit.as_deref());
    let results = spotify.search(&q, limit).await?;

    Ok((StatusCode::OK, Json(results)))
}

/// GET /api/spotify/debug - Credential/token health, without secret values.
pub async fn debug(State(spotify): State<SpotifyClient>) -> impl IntoResponse {
    Json(spotify.debug_status().await)
}

/// Build the API router.
pub fn router() -> Router<SpotifyClient> {
    Router::new()
        .route("/health", get(health))
        .route("/api/spotify/search", get(search))
        .route("/api/spotify/debug", get(debug))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_when_absent_or_unparsable() {
        assert_eq!(effective_limit(None), DEFAULT_LIMIT);
        assert_eq!(effective_limit(Some("abc")), DEFAULT_LIMIT);
        assert_eq!(effective_limit(Some("")), DEFAULT_LIMIT);
        assert_eq!(effective_limit(Some("12")), 12);
    }
}
