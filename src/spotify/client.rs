use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::{
    config::SpotifyConfig,
    error::{AppError, AppResult},
};

use super::{CurrentlyPlaying, Playback, SpotifyApi, SpotifyUser, TokenGrant};

/// `reqwest` implementation of [`SpotifyApi`].
pub struct SpotifyClient {
    client: Client,
    config: SpotifyConfig,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn token_url(&self) -> String {
        format!("{}/api/token", self.config.accounts_url.trim_end_matches('/'))
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> AppResult<TokenGrant> {
        let (client_id, client_secret) = self.config.client_credentials()?;

        let response = self
            .client
            .post(self.token_url())
            .basic_auth(client_id, Some(client_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Spotify token endpoint returned {}: {}", status, body);
            return Err(AppError::UpstreamAuth(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamAuth(format!("malformed token response: {}", e)))?;

        if grant.access_token.is_empty() {
            return Err(AppError::UpstreamAuth(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        Ok(grant)
    }
}

#[async_trait]
impl SpotifyApi for SpotifyClient {
    async fn exchange_code(&self, code: &str) -> AppResult<TokenGrant> {
        let (_, redirect_uri) = self.config.authorize_params()?;
        let grant = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .await?;

        if grant.refresh_token.as_deref().map_or(true, str::is_empty) {
            return Err(AppError::UpstreamAuth(
                "code exchange returned no refresh token".to_string(),
            ));
        }

        Ok(grant)
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<TokenGrant> {
        debug!("Refreshing Spotify access token");
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn current_user(&self, access_token: &str) -> AppResult<SpotifyUser> {
        let response = self
            .client
            .get(self.api_url("/v1/me"))
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(AppError::UpstreamAuth(
                "profile request was not authorized".to_string(),
            )),
            status => Err(AppError::Upstream(format!(
                "profile request returned {}",
                status
            ))),
        }
    }

    async fn currently_playing(&self, access_token: &str) -> AppResult<Playback> {
        let response = self
            .client
            .get(self.api_url("/v1/me/player/currently-playing"))
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(Playback::Idle),
            StatusCode::UNAUTHORIZED => Ok(Playback::Unauthorized),
            status if status.is_success() => {
                let body = response.bytes().await?;
                if body.is_empty() {
                    return Ok(Playback::Idle);
                }
                let playing: CurrentlyPlaying = serde_json::from_slice(&body).map_err(|e| {
                    AppError::Upstream(format!("malformed currently-playing response: {}", e))
                })?;
                Ok(Playback::Playing(playing))
            }
            status => Err(AppError::Upstream(format!(
                "currently-playing returned {}",
                status
            ))),
        }
    }
}
