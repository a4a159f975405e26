use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Device, DeviceUpdate, Reminder},
    services::{auth::Claims, devices::DeviceService},
    AppState,
};

use super::{super::middleware::get_user_id, MessageResponse};

fn service(state: &AppState) -> DeviceService {
    DeviceService::new(state.store.clone(), state.realtime.clone())
}

pub async fn get_devices(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<Device>>> {
    let user_id = get_user_id(&claims)?;
    let devices = service(&state).list(user_id).await?;
    Ok(Json(devices))
}

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_id: String,
    pub device_name: String,
}

pub async fn register_device(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterDeviceRequest>,
) -> AppResult<Json<Device>> {
    let user_id = get_user_id(&claims)?;
    let device = service(&state)
        .register(user_id, &req.device_id, &req.device_name)
        .await?;
    Ok(Json(device))
}

pub async fn remove_device(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(device_uuid): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let user_id = get_user_id(&claims)?;
    service(&state).remove(user_id, device_uuid).await?;

    Ok(Json(MessageResponse {
        message: "Device removed".to_string(),
    }))
}

// Device-facing routes, addressed by hardware id

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<Device>> {
    let device = service(&state).heartbeat(&device_id).await?;
    Ok(Json(device))
}

pub async fn update_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(update): Json<DeviceUpdate>,
) -> AppResult<Json<Device>> {
    let device = service(&state).update(&device_id, update).await?;
    Ok(Json(device))
}

pub async fn device_reminders(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<Vec<Reminder>>> {
    let reminders = service(&state).pending_reminders(&device_id).await?;
    Ok(Json(reminders))
}
