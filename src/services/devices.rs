use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    api::realtime::{ChangeEvent, ChangeOp, RealtimeHub, Table},
    error::{AppError, AppResult},
    models::{Device, DeviceUpdate, NewDevice, Reminder},
    storage::Store,
};

const HARDWARE_ID_MAX_LEN: usize = 64;
const NAME_MAX_LEN: usize = 100;
/// Path segments under `/api/devices` that a hardware id would shadow.
const RESERVED_HARDWARE_IDS: &[&str] = &["owned"];

pub struct DeviceService {
    store: Arc<dyn Store>,
    realtime: Arc<RealtimeHub>,
}

impl DeviceService {
    pub fn new(store: Arc<dyn Store>, realtime: Arc<RealtimeHub>) -> Self {
        Self { store, realtime }
    }

    /// Get all devices for a user, newest first
    pub async fn list(&self, user_id: Uuid) -> AppResult<Vec<Device>> {
        self.store.list_devices(user_id).await
    }

    /// Register a device under its owner
    pub async fn register(
        &self,
        user_id: Uuid,
        device_id: &str,
        device_name: &str,
    ) -> AppResult<Device> {
        let device = NewDevice {
            device_id: required(device_id, "device_id", HARDWARE_ID_MAX_LEN)?,
            device_name: required(device_name, "device_name", NAME_MAX_LEN)?,
        };
        if RESERVED_HARDWARE_IDS.contains(&device.device_id.as_str()) {
            return Err(AppError::Validation(format!(
                "device_id '{}' is reserved",
                device.device_id
            )));
        }

        let created = self.store.create_device(user_id, &device).await?;
        tracing::info!("Device registered: {} ({})", created.device_id, created.id);

        self.realtime
            .publish(
                user_id,
                ChangeEvent::new(Table::Devices, ChangeOp::Insert, &created),
            )
            .await;
        Ok(created)
    }

    pub async fn remove(&self, user_id: Uuid, id: Uuid) -> AppResult<()> {
        if !self.store.delete_device(user_id, id).await? {
            return Err(AppError::DeviceNotFound);
        }

        self.realtime
            .publish(user_id, ChangeEvent::deleted(Table::Devices, id))
            .await;
        Ok(())
    }

    /// Device check-in: marks the device online and returns its record.
    pub async fn heartbeat(&self, hardware_id: &str) -> AppResult<Device> {
        let device = self.resolve(hardware_id).await?;

        let device = self
            .store
            .record_heartbeat(device.id, Utc::now())
            .await?
            .ok_or(AppError::DeviceNotFound)?;
        tracing::debug!("Heartbeat from {}", device.device_id);

        self.realtime
            .publish(
                device.user_id,
                ChangeEvent::new(Table::Devices, ChangeOp::Update, &device),
            )
            .await;
        Ok(device)
    }

    /// Device-initiated update. Never creates a row.
    pub async fn update(&self, hardware_id: &str, mut update: DeviceUpdate) -> AppResult<Device> {
        if update.is_empty() {
            return Err(AppError::BadRequest("No fields to update".to_string()));
        }
        if let Some(name) = update.device_name.take() {
            update.device_name = Some(required(&name, "device_name", NAME_MAX_LEN)?);
        }

        let device = self.resolve(hardware_id).await?;
        let device = self
            .store
            .update_device(device.id, &update, Utc::now())
            .await?
            .ok_or(AppError::DeviceNotFound)?;

        self.realtime
            .publish(
                device.user_id,
                ChangeEvent::new(Table::Devices, ChangeOp::Update, &device),
            )
            .await;
        Ok(device)
    }

    /// Active, undismissed reminders addressed to the device.
    pub async fn pending_reminders(&self, hardware_id: &str) -> AppResult<Vec<Reminder>> {
        let device = self.resolve(hardware_id).await?;
        self.store.pending_reminders_for_device(device.id).await
    }

    // A hardware id shared by several owners cannot be attributed, so it is
    // treated like an unknown one.
    async fn resolve(&self, hardware_id: &str) -> AppResult<Device> {
        let mut matches = self.store.find_devices_by_hardware_id(hardware_id).await?;
        if matches.len() != 1 {
            if matches.len() > 1 {
                tracing::warn!("Hardware id {} is registered by several owners", hardware_id);
            }
            return Err(AppError::DeviceNotFound);
        }
        Ok(matches.remove(0))
    }
}

fn required(value: &str, field: &str, max_len: usize) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max_len {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(trimmed.to_string())
}
