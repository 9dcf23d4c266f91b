// Spotify Web API client for mirroring the bracket into playlists.
//
// Authenticates with a long-lived refresh token and caches the short-lived
// access token until shortly before it expires.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use sotd_core::error::PlaylistError;
use sotd_core::ports::PlaylistService;

use crate::config::Config;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// Access tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn issued(value: String, expires_in: i64, now: DateTime<Utc>) -> Self {
        AccessToken {
            value,
            expires_at: now + Duration::seconds(expires_in),
        }
    }

    pub(crate) fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Application credentials for the refresh-token grant.
#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

// ---------------------------------------------------------------------------
// SpotifyClient
// ---------------------------------------------------------------------------

pub struct SpotifyClient {
    http: reqwest::Client,
    api_base: String,
    accounts_base: String,
    credentials: SpotifyCredentials,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(api_base: &str, accounts_base: &str, credentials: SpotifyCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            accounts_base: accounts_base.trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// A valid access token, refreshing it first if the cached one is stale.
    async fn access_token(&self) -> anyhow::Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_base))
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .send()
            .await
            .context("Spotify token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Spotify token endpoint returned {status}: {text}"));
        }

        let body: TokenResponse = response
            .json()
            .await
            .context("failed to decode Spotify token response")?;
        debug!(expires_in = body.expires_in, "refreshed Spotify access token");

        let token = AccessToken::issued(body.access_token, body.expires_in, Utc::now());
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn tracks_url(&self, playlist: &str) -> String {
        format!("{}/playlists/{playlist}/tracks", self.api_base)
    }

    async fn modify(
        &self,
        method: reqwest::Method,
        playlist: &str,
        body: serde_json::Value,
    ) -> Result<(), PlaylistError> {
        let token = self.access_token().await.map_err(PlaylistError::Failed)?;
        let response = self
            .http
            .request(method.clone(), self.tracks_url(playlist))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("Spotify playlist request failed")
            .map_err(PlaylistError::Failed)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(request_failure(&method, playlist, status, &text))
    }
}

/// Error for a non-success playlist response. Spotify accepts removals of
/// tracks that are not on the playlist, so a 404 always means the playlist
/// itself is unknown or inaccessible.
fn request_failure(
    method: &reqwest::Method,
    playlist: &str,
    status: StatusCode,
    body: &str,
) -> PlaylistError {
    if status == StatusCode::NOT_FOUND {
        return PlaylistError::Failed(anyhow!(
            "playlist {playlist} not found ({method} returned {status}: {body})"
        ));
    }
    PlaylistError::Failed(anyhow!("{method} playlist {playlist} returned {status}: {body}"))
}

#[async_trait]
impl PlaylistService for SpotifyClient {
    async fn remove_track(&self, playlist: &str, track_id: &str) -> Result<(), PlaylistError> {
        let body = serde_json::json!({ "tracks": [{ "uri": track_uri(track_id) }] });
        self.modify(reqwest::Method::DELETE, playlist, body)
            .await
    }

    async fn add_track(&self, playlist: &str, track_id: &str) -> Result<(), PlaylistError> {
        let body = serde_json::json!({ "uris": [track_uri(track_id)] });
        self.modify(reqwest::Method::POST, playlist, body)
            .await
    }
}

// ---------------------------------------------------------------------------
// PlaylistClient wrapper
// ---------------------------------------------------------------------------

/// Either a configured Spotify client or a no-op when credentials are absent.
pub enum PlaylistClient {
    Active(SpotifyClient),
    /// Playlist mirroring is disabled (credentials missing).
    Disabled,
}

impl PlaylistClient {
    /// `Active` only when all three Spotify credentials are present.
    pub fn from_config(config: &Config) -> Self {
        let creds = &config.credentials;
        match (
            non_empty(&creds.spotify_client_id),
            non_empty(&creds.spotify_client_secret),
            non_empty(&creds.spotify_refresh_token),
        ) {
            (Some(id), Some(secret), Some(refresh)) => PlaylistClient::Active(SpotifyClient::new(
                &config.spotify.api_base,
                &config.spotify.accounts_base,
                SpotifyCredentials {
                    client_id: id.to_string(),
                    client_secret: secret.to_string(),
                    refresh_token: refresh.to_string(),
                },
            )),
            _ => PlaylistClient::Disabled,
        }
    }
}

#[async_trait]
impl PlaylistService for PlaylistClient {
    async fn remove_track(&self, playlist: &str, track_id: &str) -> Result<(), PlaylistError> {
        match self {
            PlaylistClient::Active(client) => client.remove_track(playlist, track_id).await,
            PlaylistClient::Disabled => {
                info!(playlist, track_id, "playlist mirroring disabled; skipping removal");
                Ok(())
            }
        }
    }

    async fn add_track(&self, playlist: &str, track_id: &str) -> Result<(), PlaylistError> {
        match self {
            PlaylistClient::Active(client) => client.add_track(playlist, track_id).await,
            PlaylistClient::Disabled => {
                info!(playlist, track_id, "playlist mirroring disabled; skipping addition");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn track_uri(track_id: &str) -> String {
    format!("spotify:track:{track_id}")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
