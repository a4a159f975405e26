use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{NewReminder, Reminder, ReminderChanges, ReminderFilter},
    services::{auth::Claims, reminders::ReminderService},
    AppState,
};

use super::{super::middleware::get_user_id, MessageResponse};

fn service(state: &AppState) -> ReminderService {
    ReminderService::new(state.store.clone(), state.realtime.clone())
}

pub async fn list_reminders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<ReminderFilter>,
) -> AppResult<Json<Vec<Reminder>>> {
    let user_id = get_user_id(&claims)?;
    let reminders = service(&state).list(user_id, &filter).await?;
    Ok(Json(reminders))
}

pub async fn create_reminder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NewReminder>,
) -> AppResult<Json<Reminder>> {
    let user_id = get_user_id(&claims)?;
    let reminder = service(&state).create(user_id, req).await?;
    Ok(Json(reminder))
}

pub async fn get_reminder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Reminder>> {
    let user_id = get_user_id(&claims)?;
    let reminder = service(&state).get(user_id, id).await?;
    Ok(Json(reminder))
}

pub async fn update_reminder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(changes): Json<ReminderChanges>,
) -> AppResult<Json<Reminder>> {
    let user_id = get_user_id(&claims)?;
    let reminder = service(&state).update(user_id, id, changes).await?;
    Ok(Json(reminder))
}

pub async fn delete_reminder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let user_id = get_user_id(&claims)?;
    service(&state).delete(user_id, id).await?;

    Ok(Json(MessageResponse {
        message: "Reminder deleted".to_string(),
    }))
}

pub async fn dismiss_reminder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Reminder>> {
    let user_id = get_user_id(&claims)?;
    let reminder = service(&state).dismiss(user_id, id).await?;
    Ok(Json(reminder))
}
