//! Spotify Web API seam: the authorization-code grant, token refresh and
//! the two read endpoints the dashboard uses.

pub mod client;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{config::SpotifyConfig, error::AppResult};

pub use client::SpotifyClient;

/// Read-only scopes requested at connect time.
pub const SCOPES: &[&str] = &["user-read-playback-state", "user-read-currently-playing"];

#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    /// Present on code exchange, and on refresh when Spotify rotates it.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentlyPlaying {
    #[serde(default)]
    pub is_playing: bool,
    pub item: Option<Track>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Track {
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    pub album: Option<Album>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artist {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Album {
    pub name: Option<String>,
}

/// Outcome of a currently-playing request.
#[derive(Debug, Clone)]
pub enum Playback {
    Playing(CurrentlyPlaying),
    /// 204: no active device or nothing queued.
    Idle,
    /// 401: the access token is expired or revoked.
    Unauthorized,
}

#[async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn exchange_code(&self, code: &str) -> AppResult<TokenGrant>;
    /// Fails with `UpstreamAuth` unless Spotify answers 2xx with a non-empty token.
    async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<TokenGrant>;
    async fn current_user(&self, access_token: &str) -> AppResult<SpotifyUser>;
    async fn currently_playing(&self, access_token: &str) -> AppResult<Playback>;
}

/// Spotify authorization URL for the given signed `state`.
pub fn authorize_url(config: &SpotifyConfig, state: &str) -> AppResult<String> {
    let (client_id, redirect_uri) = config.authorize_params()?;
    let base = format!("{}/authorize", config.accounts_url.trim_end_matches('/'));
    let scope = SCOPES.join(" ");

    let url = reqwest::Url::parse_with_params(
        &base,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
        ],
    )
    .map_err(|e| crate::error::AppError::Configuration(format!("invalid accounts URL: {}", e)))?;

    Ok(url.into())
}
