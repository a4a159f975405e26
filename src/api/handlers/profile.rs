use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::{
    api::realtime::{ChangeEvent, ChangeOp, Table},
    error::{AppError, AppResult},
    models::{validate_username, ProfileView},
    services::auth::Claims,
    AppState,
};

use super::super::middleware::get_user_id;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<ProfileView>> {
    let user_id = get_user_id(&claims)?;

    let profile = state
        .store
        .get_profile(user_id)
        .await?
        .ok_or(AppError::ProfileNotFound)?;

    Ok(Json(profile.view()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<ProfileView>> {
    let user_id = get_user_id(&claims)?;

    let username = req
        .username
        .ok_or_else(|| AppError::BadRequest("No fields to update".to_string()))?;
    let username = validate_username(&username).map_err(AppError::Validation)?;

    let profile = state
        .store
        .update_username(user_id, username)
        .await?
        .ok_or(AppError::ProfileNotFound)?
        .view();

    state
        .realtime
        .publish(
            user_id,
            ChangeEvent::new(Table::Profiles, ChangeOp::Update, &profile),
        )
        .await;

    Ok(Json(profile))
}
