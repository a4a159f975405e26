//! Persistence seam. Handlers and services talk to a `Store` trait object
//! that is built once at startup and carried in `AppState`.

pub mod postgres;
pub mod redis;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        Device, DeviceUpdate, NewDevice, NewReminder, NowPlaying, Profile, Reminder,
        ReminderFilter, SpotifyConnection, SpotifyTokens, User,
    },
};

#[async_trait]
pub trait Store: Send + Sync {
    // Accounts and profiles

    /// Creates the login identity and its profile together.
    /// Fails with `UserAlreadyExists` when the email is taken.
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
        username: &str,
    ) -> AppResult<(User, Profile)>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>>;
    async fn update_username(&self, user_id: Uuid, username: &str) -> AppResult<Option<Profile>>;

    // Spotify credentials

    /// Both tokens, or `None` if the profile is not connected.
    async fn spotify_tokens(&self, user_id: Uuid) -> AppResult<Option<SpotifyTokens>>;
    async fn save_spotify_connection(
        &self,
        user_id: Uuid,
        connection: &SpotifyConnection,
    ) -> AppResult<Option<Profile>>;
    /// Stores a refreshed access token, and the rotated refresh token if any.
    async fn update_spotify_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> AppResult<()>;
    async fn clear_spotify_connection(&self, user_id: Uuid) -> AppResult<Option<Profile>>;

    // Devices

    async fn list_devices(&self, user_id: Uuid) -> AppResult<Vec<Device>>;
    async fn get_device(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Device>>;
    /// Fails with `DeviceAlreadyExists` on a duplicate hardware id for the owner.
    async fn create_device(&self, user_id: Uuid, device: &NewDevice) -> AppResult<Device>;
    async fn delete_device(&self, user_id: Uuid, id: Uuid) -> AppResult<bool>;
    /// Devices registered under a hardware id, across owners.
    async fn find_devices_by_hardware_id(&self, device_id: &str) -> AppResult<Vec<Device>>;
    async fn record_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Device>>;
    async fn update_device(
        &self,
        id: Uuid,
        update: &DeviceUpdate,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Device>>;
    /// Flips online devices silent for longer than `offline_after` to offline
    /// and returns them.
    async fn mark_stale_devices_offline(
        &self,
        now: DateTime<Utc>,
        offline_after: chrono::Duration,
    ) -> AppResult<Vec<Device>>;

    // Reminders

    async fn list_reminders(&self, user_id: Uuid, filter: &ReminderFilter)
        -> AppResult<Vec<Reminder>>;
    async fn pending_reminders_for_device(&self, device: Uuid) -> AppResult<Vec<Reminder>>;
    async fn get_reminder(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Reminder>>;
    async fn create_reminder(&self, user_id: Uuid, reminder: &NewReminder) -> AppResult<Reminder>;
    /// Writes every mutable column of `reminder`, scoped to its owner.
    async fn save_reminder(&self, reminder: &Reminder) -> AppResult<Option<Reminder>>;
    async fn delete_reminder(&self, user_id: Uuid, id: Uuid) -> AppResult<bool>;

    // Now-playing cache

    /// Writes the cache row only while the profile is still connected;
    /// `None` means the connection was cleared in the meantime.
    async fn upsert_now_playing(&self, entry: &NowPlaying) -> AppResult<Option<NowPlaying>>;
    async fn clear_now_playing(&self, user_id: Uuid) -> AppResult<()>;
}
