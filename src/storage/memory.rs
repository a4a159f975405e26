//! In-process `Store` used by unit and router tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        Device, DeviceUpdate, NewDevice, NewReminder, NowPlaying, Profile, Reminder,
        ReminderFilter, SpotifyConnection, SpotifyTokens, User,
    },
};

use super::Store;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    profiles: Vec<Profile>,
    devices: Vec<Device>,
    reminders: Vec<Reminder>,
    now_playing: Vec<NowPlaying>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user with a profile and returns its id.
    pub fn seed_user(&self, username: &str) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut tables = self.tables.lock().unwrap();
        tables.users.push(User {
            id,
            email: format!("{}@example.com", username),
            password_hash: String::new(),
            created_at: now,
        });
        tables.profiles.push(Profile {
            id,
            username: username.to_string(),
            spotify_access_token: None,
            spotify_refresh_token: None,
            spotify_user_id: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn set_tokens(&self, user_id: Uuid, access: &str, refresh: &str) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(p) = tables.profiles.iter_mut().find(|p| p.id == user_id) {
            p.spotify_access_token = Some(access.to_string());
            p.spotify_refresh_token = Some(refresh.to_string());
            p.spotify_user_id = Some(format!("spotify-{}", p.username));
        }
    }

    pub fn profile(&self, user_id: Uuid) -> Option<Profile> {
        let tables = self.tables.lock().unwrap();
        tables.profiles.iter().find(|p| p.id == user_id).cloned()
    }

    pub fn cached(&self, user_id: Uuid) -> Option<NowPlaying> {
        let tables = self.tables.lock().unwrap();
        tables.now_playing.iter().find(|n| n.user_id == user_id).cloned()
    }

    pub fn device_count(&self) -> usize {
        self.tables.lock().unwrap().devices.len()
    }

    pub fn set_last_seen(&self, id: Uuid, at: DateTime<Utc>) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(d) = tables.devices.iter_mut().find(|d| d.id == id) {
            d.last_seen = at;
        }
    }
}

// Same predicate as the SQL sweep: strictly older than the window.
fn is_stale(last_seen: DateTime<Utc>, now: DateTime<Utc>, offline_after: Duration) -> bool {
    now - last_seen > offline_after
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
        username: &str,
    ) -> AppResult<(User, Profile)> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.email == email) {
            return Err(AppError::UserAlreadyExists);
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        };
        let profile = Profile {
            id: user.id,
            username: username.to_string(),
            spotify_access_token: None,
            spotify_refresh_token: None,
            spotify_user_id: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        tables.profiles.push(profile.clone());
        Ok((user, profile))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        Ok(self.profile(user_id))
    }

    async fn update_username(&self, user_id: Uuid, username: &str) -> AppResult<Option<Profile>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .profiles
            .iter_mut()
            .find(|p| p.id == user_id)
            .map(|p| {
                p.username = username.to_string();
                p.updated_at = Utc::now();
                p.clone()
            }))
    }

    async fn spotify_tokens(&self, user_id: Uuid) -> AppResult<Option<SpotifyTokens>> {
        Ok(self.profile(user_id).and_then(|p| {
            match (p.spotify_access_token, p.spotify_refresh_token) {
                (Some(access_token), Some(refresh_token)) => Some(SpotifyTokens {
                    access_token,
                    refresh_token,
                }),
                _ => None,
            }
        }))
    }

    async fn save_spotify_connection(
        &self,
        user_id: Uuid,
        connection: &SpotifyConnection,
    ) -> AppResult<Option<Profile>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .profiles
            .iter_mut()
            .find(|p| p.id == user_id)
            .map(|p| {
                p.spotify_access_token = Some(connection.access_token.clone());
                p.spotify_refresh_token = Some(connection.refresh_token.clone());
                p.spotify_user_id = Some(connection.spotify_user_id.clone());
                p.clone()
            }))
    }

    async fn update_spotify_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> AppResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(p) = tables
            .profiles
            .iter_mut()
            .find(|p| p.id == user_id && p.spotify_refresh_token.is_some())
        {
            p.spotify_access_token = Some(access_token.to_string());
            if let Some(refresh) = refresh_token {
                p.spotify_refresh_token = Some(refresh.to_string());
            }
        }
        Ok(())
    }

    async fn clear_spotify_connection(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .profiles
            .iter_mut()
            .find(|p| p.id == user_id)
            .map(|p| {
                p.spotify_access_token = None;
                p.spotify_refresh_token = None;
                p.spotify_user_id = None;
                p.clone()
            }))
    }

    async fn list_devices(&self, user_id: Uuid) -> AppResult<Vec<Device>> {
        let tables = self.tables.lock().unwrap();
        let mut devices: Vec<Device> = tables
            .devices
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(devices)
    }

    async fn get_device(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Device>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .devices
            .iter()
            .find(|d| d.id == id && d.user_id == user_id)
            .cloned())
    }

    async fn create_device(&self, user_id: Uuid, device: &NewDevice) -> AppResult<Device> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .devices
            .iter()
            .any(|d| d.user_id == user_id && d.device_id == device.device_id)
        {
            return Err(AppError::DeviceAlreadyExists);
        }
        let now = Utc::now();
        let created = Device {
            id: Uuid::new_v4(),
            user_id,
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            is_online: true,
            last_seen: now,
            created_at: now,
        };
        tables.devices.push(created.clone());
        Ok(created)
    }

    async fn delete_device(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.devices.len();
        tables.devices.retain(|d| !(d.id == id && d.user_id == user_id));
        let removed = tables.devices.len() < before;
        if removed {
            tables.reminders.retain(|r| r.device_id != id);
        }
        Ok(removed)
    }

    async fn find_devices_by_hardware_id(&self, device_id: &str) -> AppResult<Vec<Device>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .devices
            .iter()
            .filter(|d| d.device_id == device_id)
            .take(2)
            .cloned()
            .collect())
    }

    async fn record_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Device>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.devices.iter_mut().find(|d| d.id == id).map(|d| {
            d.last_seen = at;
            d.is_online = true;
            d.clone()
        }))
    }

    async fn update_device(
        &self,
        id: Uuid,
        update: &DeviceUpdate,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Device>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.devices.iter_mut().find(|d| d.id == id).map(|d| {
            if let Some(name) = &update.device_name {
                d.device_name = name.clone();
            }
            if let Some(online) = update.is_online {
                d.is_online = online;
                if online {
                    d.last_seen = at;
                }
            }
            d.clone()
        }))
    }

    async fn mark_stale_devices_offline(
        &self,
        now: DateTime<Utc>,
        offline_after: Duration,
    ) -> AppResult<Vec<Device>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .devices
            .iter_mut()
            .filter(|d| d.is_online && is_stale(d.last_seen, now, offline_after))
            .map(|d| {
                d.is_online = false;
                d.clone()
            })
            .collect())
    }

    async fn list_reminders(
        &self,
        user_id: Uuid,
        filter: &ReminderFilter,
    ) -> AppResult<Vec<Reminder>> {
        let tables = self.tables.lock().unwrap();
        let mut reminders: Vec<Reminder> = tables
            .reminders
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| filter.include_inactive || r.is_active)
            .filter(|r| filter.device_id.map_or(true, |d| r.device_id == d))
            .cloned()
            .collect();
        reminders.sort_by_key(|r| r.reminder_time);
        Ok(reminders)
    }

    async fn pending_reminders_for_device(&self, device: Uuid) -> AppResult<Vec<Reminder>> {
        let tables = self.tables.lock().unwrap();
        let mut reminders: Vec<Reminder> = tables
            .reminders
            .iter()
            .filter(|r| r.device_id == device && r.is_active && !r.is_dismissed)
            .cloned()
            .collect();
        reminders.sort_by_key(|r| r.reminder_time);
        Ok(reminders)
    }

    async fn get_reminder(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Reminder>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .reminders
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
            .cloned())
    }

    async fn create_reminder(&self, user_id: Uuid, reminder: &NewReminder) -> AppResult<Reminder> {
        let now = Utc::now();
        let created = Reminder {
            id: Uuid::new_v4(),
            user_id,
            device_id: reminder.device_id,
            title: reminder.title.clone(),
            message: reminder.message.clone(),
            reminder_time: reminder.reminder_time,
            is_recurring: reminder.is_recurring,
            recurrence_pattern: reminder.recurrence_pattern,
            is_active: true,
            is_dismissed: false,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().reminders.push(created.clone());
        Ok(created)
    }

    async fn save_reminder(&self, reminder: &Reminder) -> AppResult<Option<Reminder>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .reminders
            .iter_mut()
            .find(|r| r.id == reminder.id && r.user_id == reminder.user_id)
            .map(|r| {
                *r = Reminder {
                    updated_at: Utc::now(),
                    ..reminder.clone()
                };
                r.clone()
            }))
    }

    async fn delete_reminder(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.reminders.len();
        tables
            .reminders
            .retain(|r| !(r.id == id && r.user_id == user_id));
        Ok(tables.reminders.len() < before)
    }

    async fn upsert_now_playing(&self, entry: &NowPlaying) -> AppResult<Option<NowPlaying>> {
        let mut tables = self.tables.lock().unwrap();
        let connected = tables
            .profiles
            .iter()
            .any(|p| p.id == entry.user_id && p.spotify_refresh_token.is_some());
        if !connected {
            return Ok(None);
        }
        tables.now_playing.retain(|n| n.user_id != entry.user_id);
        tables.now_playing.push(entry.clone());
        Ok(Some(entry.clone()))
    }

    async fn clear_now_playing(&self, user_id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.now_playing.retain(|n| n.user_id != user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_only_after_the_window() {
        let now = Utc::now();
        let window = Duration::minutes(5);

        assert!(!is_stale(now - Duration::minutes(5), now, window));
        assert!(is_stale(now - Duration::minutes(5) - Duration::seconds(1), now, window));
        assert!(!is_stale(now, now, window));
    }

    #[tokio::test]
    async fn now_playing_is_not_cached_for_a_disconnected_profile() {
        let store = MemoryStore::new();
        let user = store.seed_user("alice");
        let entry = NowPlaying {
            user_id: user,
            track_name: "Song".to_string(),
            artist_name: "Band".to_string(),
            album_name: "LP".to_string(),
            is_playing: true,
            updated_at: Utc::now(),
        };

        assert!(store.upsert_now_playing(&entry).await.unwrap().is_none());
        assert!(store.cached(user).is_none());

        store.set_tokens(user, "access", "refresh");
        assert!(store.upsert_now_playing(&entry).await.unwrap().is_some());
        assert!(store.cached(user).is_some());
    }
}
