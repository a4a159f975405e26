use std::sync::Arc;

use uuid::Uuid;

use crate::{
    api::realtime::{ChangeEvent, ChangeOp, RealtimeHub, Table},
    config::Config,
    error::{AppError, AppResult},
    models::{Profile, SpotifyConnection},
    services::{auth::AuthService, now_playing::RefreshLocks},
    spotify::{self, SpotifyApi},
    storage::Store,
};

/// Query parameters Spotify appends to the redirect URI.
#[derive(Debug, Default, serde::Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub struct SpotifyAuthService {
    store: Arc<dyn Store>,
    spotify: Arc<dyn SpotifyApi>,
    locks: Arc<RefreshLocks>,
    realtime: Arc<RealtimeHub>,
    config: Arc<Config>,
}

impl SpotifyAuthService {
    pub fn new(
        store: Arc<dyn Store>,
        spotify: Arc<dyn SpotifyApi>,
        locks: Arc<RefreshLocks>,
        realtime: Arc<RealtimeHub>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            spotify,
            locks,
            realtime,
            config,
        }
    }

    fn auth(&self) -> AuthService {
        AuthService::new(self.store.clone(), self.config.clone())
    }

    /// Authorization URL for `user_id`. Fails with `Configuration` before
    /// anything is signed when the client id or redirect URI is missing.
    pub fn connect_url(&self, user_id: Uuid) -> AppResult<String> {
        self.config.spotify.authorize_params()?;
        let state = self.auth().issue_connect_state(user_id)?;
        spotify::authorize_url(&self.config.spotify, &state)
    }

    /// Completes the authorization-code grant and stores the connection.
    pub async fn complete(&self, params: CallbackParams) -> AppResult<Profile> {
        if let Some(error) = params.error {
            return Err(AppError::UpstreamAuth(format!("authorization denied: {}", error)));
        }
        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing code".to_string()))?;
        let state = params
            .state
            .ok_or_else(|| AppError::BadRequest("missing state".to_string()))?;

        let user_id = self.auth().verify_connect_state(&state)?;

        let grant = self.spotify.exchange_code(&code).await?;
        let refresh_token = grant
            .refresh_token
            .ok_or_else(|| AppError::UpstreamAuth("no refresh token issued".to_string()))?;
        let spotify_user = self.spotify.current_user(&grant.access_token).await?;
        tracing::info!(
            "Spotify connected for {} as {}",
            user_id,
            spotify_user.display_name.as_deref().unwrap_or(&spotify_user.id)
        );

        let connection = SpotifyConnection {
            access_token: grant.access_token,
            refresh_token,
            spotify_user_id: spotify_user.id,
        };

        let profile = self
            .store
            .save_spotify_connection(user_id, &connection)
            .await?
            .ok_or(AppError::ProfileNotFound)?;

        self.realtime
            .publish(
                user_id,
                ChangeEvent::new(Table::Profiles, ChangeOp::Update, &profile.view()),
            )
            .await;

        Ok(profile)
    }

    /// Clears the stored credentials and the now-playing cache. Waits for an
    /// in-flight now-playing fetch of the same user to finish first.
    pub async fn disconnect(&self, user_id: Uuid) -> AppResult<Profile> {
        let _scope = self.locks.scoped(user_id).await;

        let profile = self
            .store
            .clear_spotify_connection(user_id)
            .await?
            .ok_or(AppError::ProfileNotFound)?;
        self.store.clear_now_playing(user_id).await?;

        tracing::info!("Spotify disconnected for {}", user_id);
        self.realtime
            .publish(
                user_id,
                ChangeEvent::new(Table::Profiles, ChangeOp::Update, &profile.view()),
            )
            .await;
        self.realtime
            .publish(user_id, ChangeEvent::deleted(Table::NowPlaying, user_id))
            .await;

        Ok(profile)
    }
}
