use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Hardware identifier reported by the ESP32, unique per owner.
    pub device_id: String,
    pub device_name: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub device_id: String,
    pub device_name: String,
}

/// Fields a device may change about itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceUpdate {
    pub device_name: Option<String>,
    pub is_online: Option<bool>,
}

impl DeviceUpdate {
    pub fn is_empty(&self) -> bool {
        self.device_name.is_none() && self.is_online.is_none()
    }
}
