use axum::{
    extract::{Query, State},
    response::Redirect,
    Extension, Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    services::{
        auth::Claims,
        now_playing::{NowPlayingOutcome, NowPlayingService},
        spotify_auth::{CallbackParams, SpotifyAuthService},
    },
    AppState,
};

use super::{super::middleware::get_user_id, MessageResponse};

fn auth_service(state: &AppState) -> SpotifyAuthService {
    SpotifyAuthService::new(
        state.store.clone(),
        state.spotify.clone(),
        state.refresh_locks.clone(),
        state.realtime.clone(),
        state.config.clone(),
    )
}

/// Sends the browser to Spotify's consent page.
pub async fn connect(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Redirect> {
    let user_id = get_user_id(&claims)?;

    match auth_service(&state).connect_url(user_id) {
        Ok(url) => Ok(Redirect::to(&url)),
        Err(AppError::Configuration(reason)) => {
            tracing::error!("Spotify connect unavailable: {}", reason);
            Ok(Redirect::to(
                &state.config.settings_url("error", "spotify_not_configured"),
            ))
        }
        Err(e) => Err(e),
    }
}

/// OAuth redirect target. Always lands the browser back on the settings page.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    match auth_service(&state).complete(params).await {
        Ok(_) => Redirect::to(&state.config.settings_url("spotify", "connected")),
        Err(e) => {
            tracing::warn!("Spotify callback failed: {}", e);
            Redirect::to(&state.config.settings_url("error", "spotify_auth_failed"))
        }
    }
}

pub async fn disconnect(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<MessageResponse>> {
    let user_id = get_user_id(&claims)?;
    auth_service(&state).disconnect(user_id).await?;

    Ok(Json(MessageResponse {
        message: "Spotify disconnected".to_string(),
    }))
}

pub async fn now_playing(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Value>> {
    let user_id = get_user_id(&claims)?;

    let service = NowPlayingService::new(
        state.store.clone(),
        state.spotify.clone(),
        state.refresh_locks.clone(),
        state.realtime.clone(),
    );

    let body = match service.fetch(user_id).await? {
        NowPlayingOutcome::Playing(entry) => serde_json::to_value(entry)
            .map_err(|e| anyhow::anyhow!("Encode error: {}", e))?,
        NowPlayingOutcome::NotPlaying => json!({ "is_playing": false }),
    };
    Ok(Json(body))
}
