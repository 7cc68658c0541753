//! Spotify Web API client.
//!
//! Uses Client Credentials flow for server-to-server authentication. One
//! token slot is shared by all callers; refreshes are serialized so that
//! concurrent cache misses coalesce onto a single upstream acquisition.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::SpotifyError;
use crate::retry::{send_with_retry, FetchError, RetryPolicy};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Seconds subtracted from the upstream-declared lifetime so tokens are
/// refreshed before Spotify actually invalidates them.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Default result limit when the caller supplies none.
pub const DEFAULT_LIMIT: u32 = 6;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Spotify API client with token caching.
#[derive(Clone)]
pub struct SpotifyClient {
    client: Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    token_url: String,
    api_base: String,
    token_policy: RetryPolicy,
    search_policy: RetryPolicy,
    token: Arc<RwLock<Option<CachedToken>>>,
    refresh_gate: Arc<Mutex<()>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn new(access_token: String, expires_in_secs: u64) -> Self {
        let lifetime = expires_in_secs.saturating_sub(EXPIRY_MARGIN_SECS);
        Self {
            access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        }
    }

    fn is_valid(&self) -> bool {
        self.expires_at > Instant::now()
    }

    fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

impl SpotifyClient {
    pub fn new(client_id: Option<String>, client_secret: Option<String>) -> Self {
        Self::with_base_urls(client_id, client_secret, TOKEN_URL, API_BASE)
    }

    /// Same as [`new`](Self::new) with overridable endpoints, for tests.
    pub fn with_base_urls(
        client_id: Option<String>,
        client_secret: Option<String>,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            client_id,
            client_secret,
            token_url: token_url.into(),
            api_base: api_base.into(),
            token_policy: RetryPolicy::linear(2, Duration::from_millis(700)),
            search_policy: RetryPolicy::exponential(2, Duration::from_millis(400)),
            token: Arc::new(RwLock::new(None)),
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Overrides the retry schedules, for tests.
    pub fn with_retry_policies(mut self, token: RetryPolicy, search: RetryPolicy) -> Self {
        self.token_policy = token;
        self.search_policy = search;
        self
    }

    /// Returns a valid bearer token, refreshing if needed.
    ///
    /// The fast path (valid cached token) performs no network call. On the
    /// slow path, overlapping callers queue on the refresh gate and re-check
    /// the cache, so only one of them hits the token endpoint.
    pub async fn ensure_token(&self) -> Result<String, SpotifyError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // A concurrent caller may have refreshed while we waited.
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let token = self.acquire_token().await?;
        let value = token.access_token.clone();
        *self.token.write().await = Some(token);
        Ok(value)
    }

    async fn cached_token(&self) -> Option<String> {
        let guard = self.token.read().await;
        guard
            .as_ref()
            .filter(|t| t.is_valid())
            .map(|t| t.access_token.clone())
    }

    /// Bounded-retry acquisition: every failure class is retried, with a
    /// linear backoff between attempts. The last error is the one surfaced.
    async fn acquire_token(&self) -> Result<CachedToken, SpotifyError> {
        let (id, secret) = self.credentials()?;
        let auth =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", id, secret));

        let attempts = self.token_policy.attempts();
        let mut last = String::new();
        for attempt in 0..attempts {
            match self.request_token(&auth).await {
                Ok(token) => {
                    tracing::info!(token_length = token.access_token.len(), "got Spotify token");
                    return Ok(token);
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "token attempt failed");
                    last = err;
                }
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(self.token_policy.delay_for(attempt)).await;
            }
        }
        Err(SpotifyError::TokenAcquisition(last))
    }

    async fn request_token(&self, auth: &str) -> Result<CachedToken, String> {
        let res = self
            .client
            .post(&self.token_url)
            .header("Authorization", format!("Basic {}", auth))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| format!("token request failed: {}", e))?;

        let status = res.status();
        let text = res.text().await.unwrap_or_default();

        if !status.is_success() {
            // Prefer the structured OAuth error body for the diagnostic.
            if let Ok(err) = serde_json::from_str::<OauthErrorBody>(&text) {
                return Err(format!(
                    "{}: {}",
                    err.error,
                    err.error_description.unwrap_or_default()
                ));
            }
            return Err(format!("status {} - {}", status, truncate(&text)));
        }

        let body: TokenResponse =
            serde_json::from_str(&text).map_err(|e| format!("token parse failed: {}", e))?;
        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "invalid token response: missing access_token".to_string())?;

        Ok(CachedToken::new(
            access_token,
            body.expires_in.unwrap_or(3600),
        ))
    }

    fn credentials(&self) -> Result<(&str, &str), SpotifyError> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(SpotifyError::Configuration(
                "missing SPOTIFY_CLIENT_ID or SPOTIFY_CLIENT_SECRET".into(),
            )),
        }
    }

    /// Searches the catalog for tracks and playlists concurrently.
    ///
    /// Either half failing to fetch or parse degrades to an empty list for
    /// that half; only both halves failing is an error.
    pub async fn search(&self, query: &str, limit: u32) -> Result<SearchResults, SpotifyError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SpotifyError::InvalidQuery(
                "query 'q' is required and cannot be empty".into(),
            ));
        }
        let limit = limit.clamp(1, 50);

        let token = self.ensure_token().await?;
        tracing::info!(query, limit, "searching catalog");

        let (track_body, playlist_body) = tokio::join!(
            self.search_body(query, "track", limit, &token),
            self.search_body(query, "playlist", limit, &token),
        );

        let tracks = match track_body {
            Ok(body) => Some(parse_tracks(&body)),
            Err(err) => {
                tracing::warn!(error = %err, "track search failed");
                None
            }
        };
        let playlists = match playlist_body {
            Ok(body) => Some(parse_playlists(&body)),
            Err(err) => {
                tracing::warn!(error = %err, "playlist search failed");
                None
            }
        };

        if tracks.is_none() && playlists.is_none() {
            return Err(SpotifyError::SearchFailed(
                "both track and playlist lookups failed".into(),
            ));
        }

        Ok(SearchResults {
            tracks: tracks.unwrap_or_default(),
            playlists: playlists.unwrap_or_default(),
        })
    }

    async fn search_body(
        &self,
        query: &str,
        kind: &str,
        limit: u32,
        token: &str,
    ) -> Result<String, FetchError> {
        let url = format!(
            "{}/search?q={}&type={}&limit={}",
            self.api_base,
            urlencoding::encode(query),
            kind,
            limit,
        );
        let res = send_with_retry(
            self.client
                .get(&url)
                .header("Authorization", format!("Bearer {}", token)),
            &self.search_policy,
        )
        .await?;
        Ok(res.text().await.unwrap_or_default())
    }

    /// Reports credential/token health without leaking either value.
    pub async fn debug_status(&self) -> DebugStatus {
        let (token_cached, token_valid, expires_in_sec) = {
            let guard = self.token.read().await;
            match guard.as_ref() {
                Some(t) => (true, t.is_valid(), t.remaining().as_secs()),
                None => (false, false, 0),
            }
        };

        let probe = match self.ensure_token().await {
            Ok(token) => ProbeResult {
                ok: true,
                token_length: Some(token.len()),
                error: None,
            },
            Err(err) => ProbeResult {
                ok: false,
                token_length: None,
                error: Some(err.to_string()),
            },
        };

        DebugStatus {
            client_id_exists: self.client_id.is_some(),
            client_secret_exists: self.client_secret.is_some(),
            token_cached,
            token_valid,
            expires_in_sec,
            probe,
        }
    }
}

fn truncate(text: &str) -> &str {
    let end = text
        .char_indices()
        .nth(1000)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[..end]
}

fn parse_tracks(body: &str) -> Vec<NormalizedTrack> {
    match serde_json::from_str::<TrackSearchResponse>(body) {
        Ok(parsed) => parsed
            .tracks
            .items
            .into_iter()
            .flatten()
            .filter_map(normalize_track)
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "track response unparsable, treating as empty");
            Vec::new()
        }
    }
}

fn parse_playlists(body: &str) -> Vec<NormalizedPlaylist> {
    match serde_json::from_str::<PlaylistSearchResponse>(body) {
        Ok(parsed) => parsed
            .playlists
            .items
            .into_iter()
            .flatten()
            .filter_map(normalize_playlist)
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "playlist response unparsable, treating as empty");
            Vec::new()
        }
    }
}

/// An entry without a name is treated as corrupt and dropped; every other
/// field falls back rather than failing.
fn normalize_track(raw: RawTrack) -> Option<NormalizedTrack> {
    let title = raw.name.filter(|n| !n.is_empty())?;
    let artist_names: Vec<String> = raw
        .artists
        .into_iter()
        .flatten()
        .filter_map(|a| a.name)
        .collect();

    Some(NormalizedTrack {
        artist: artist_names
            .first()
            .cloned()
            .unwrap_or_else(|| "Unknown".into()),
        artists: artist_names,
        album: raw
            .album
            .as_ref()
            .and_then(|a| a.name.clone())
            .unwrap_or_default(),
        album_art: raw
            .album
            .and_then(|a| a.images.into_iter().next())
            .and_then(|i| i.url)
            .unwrap_or_default(),
        preview_url: raw.preview_url.unwrap_or_default(),
        spotify_url: raw
            .external_urls
            .and_then(|u| u.spotify)
            .unwrap_or_default(),
        title,
    })
}

fn normalize_playlist(raw: RawPlaylist) -> Option<NormalizedPlaylist> {
    let name = raw.name.filter(|n| !n.is_empty())?;
    Some(NormalizedPlaylist {
        name,
        description: raw.description.unwrap_or_default(),
        owner: raw
            .owner
            .and_then(|o| o.display_name)
            .unwrap_or_else(|| "Unknown".into()),
        image: raw
            .images
            .into_iter()
            .next()
            .and_then(|i| i.url)
            .unwrap_or_default(),
        spotify_url: raw
            .external_urls
            .and_then(|u| u.spotify)
            .unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// Wire formats
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct OauthErrorBody {
    error: String,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct TrackSearchResponse {
    #[serde(default)]
    tracks: Page<RawTrack>,
}

#[derive(Deserialize)]
struct PlaylistSearchResponse {
    #[serde(default)]
    playlists: Page<RawPlaylist>,
}

/// The catalog sometimes includes literal `null` entries in `items`.
#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<Option<T>>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Deserialize)]
struct RawTrack {
    name: Option<String>,
    #[serde(default)]
    artists: Vec<Option<RawArtist>>,
    album: Option<RawAlbum>,
    preview_url: Option<String>,
    external_urls: Option<ExternalUrls>,
}

#[derive(Deserialize)]
struct RawArtist {
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawAlbum {
    name: Option<String>,
    #[serde(default)]
    images: Vec<RawImage>,
}

#[derive(Deserialize)]
struct RawImage {
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawPlaylist {
    name: Option<String>,
    description: Option<String>,
    owner: Option<RawOwner>,
    #[serde(default)]
    images: Vec<RawImage>,
    external_urls: Option<ExternalUrls>,
}

#[derive(Deserialize)]
struct RawOwner {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalized output
// ---------------------------------------------------------------------------

/// A track with every field guaranteed present.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTrack {
    pub title: String,
    pub artist: String,
    pub artists: Vec<String>,
    pub album: String,
    pub album_art: String,
    pub preview_url: String,
    pub spotify_url: String,
}

/// A playlist with every field guaranteed present.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPlaylist {
    pub name: String,
    pub description: String,
    pub owner: String,
    pub image: String,
    pub spotify_url: String,
}

/// Combined normalized search result.
#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub tracks: Vec<NormalizedTrack>,
    pub playlists: Vec<NormalizedPlaylist>,
}

/// Credential/token health report for the debug endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugStatus {
    pub client_id_exists: bool,
    pub client_secret_exists: bool,
    pub token_cached: bool,
    pub token_valid: bool,
    pub expires_in_sec: u64,
    pub probe: ProbeResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_expiry_reserves_safety_margin() {
        let token = CachedToken::new("t".into(), 3600);
        let remaining = token.remaining().as_secs();
        assert!(remaining <= 3540, "remaining {} exceeds margin", remaining);
        assert!(remaining >= 3538);
    }

    #[test]
    fn token_shorter_than_margin_is_immediately_stale() {
        let token = CachedToken::new("t".into(), 30);
        assert!(!token.is_valid());
    }

    #[test]
    fn track_without_name_is_dropped() {
        let body = serde_json::json!({
            "tracks": { "items": [
                {
                    "name": "So What",
                    "artists": [{ "name": "Miles Davis" }, { "name": "John Coltrane" }],
                    "album": { "name": "Kind of Blue", "images": [{ "url": "http://img/a" }] },
                    "preview_url": "http://preview/a",
                    "external_urls": { "spotify": "http://open/a" }
                },
                { "artists": [{ "name": "Nobody" }] },
                null
            ] }
        })
        .to_string();

        let tracks = parse_tracks(&body);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "So What");
        assert_eq!(tracks[0].artist, "Miles Davis");
        assert_eq!(tracks[0].artists, vec!["Miles Davis", "John Coltrane"]);
        assert_eq!(tracks[0].album, "Kind of Blue");
        assert_eq!(tracks[0].album_art, "http://img/a");
    }

    #[test]
    fn playlist_missing_owner_gets_fallback_not_dropped() {
        let body = serde_json::json!({
            "playlists": { "items": [
                { "name": "Chill Vibes", "owner": null },
                { "description": "no name here" }
            ] }
        })
        .to_string();

        let playlists = parse_playlists(&body);
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].name, "Chill Vibes");
        assert_eq!(playlists[0].owner, "Unknown");
        assert_eq!(playlists[0].description, "");
        assert_eq!(playlists[0].image, "");
    }

    #[test]
    fn unparsable_body_yields_empty_list() {
        assert!(parse_tracks("not json").is_empty());
        assert!(parse_playlists("{\"playlists\":null}").is_empty());
    }

    #[test]
    fn track_with_empty_artist_list_gets_unknown_artist() {
        let body = serde_json::json!({
            "tracks": { "items": [ { "name": "Lonely", "artists": [] } ] }
        })
        .to_string();

        let tracks = parse_tracks(&body);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].artist, "Unknown");
        assert!(tracks[0].artists.is_empty());
        assert_eq!(tracks[0].preview_url, "");
        assert_eq!(tracks[0].spotify_url, "");
    }
}
