use axum::{extract::State, http::header::SET_COOKIE, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{ProfileView, SessionToken},
    services::auth::AuthService,
    AppState,
};

use super::{super::middleware::SESSION_COOKIE, MessageResponse};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub profile: ProfileView,
    pub session: SessionToken,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> AppResult<impl IntoResponse> {
    let auth_service = AuthService::new(state.store.clone(), state.config.clone());
    let (profile, session) = auth_service
        .signup(&req.email, &req.password, &req.username)
        .await?;

    Ok(with_session(&state, profile.view(), session))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let auth_service = AuthService::new(state.store.clone(), state.config.clone());
    let (profile, session) = auth_service.login(&req.email, &req.password).await?;

    Ok(with_session(&state, profile.view(), session))
}

pub async fn logout() -> impl IntoResponse {
    (
        [(SET_COOKIE, session_cookie("", 0))],
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}

fn with_session(state: &AppState, profile: ProfileView, session: SessionToken) -> impl IntoResponse {
    let cookie = session_cookie(
        &session.access_token,
        state.config.jwt.session_ttl.as_secs(),
    );
    ([(SET_COOKIE, cookie)], Json(AuthResponse { profile, session }))
}

fn session_cookie(token: &str, max_age: u64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age
    )
}
