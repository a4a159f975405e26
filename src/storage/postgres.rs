use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{on_unique_violation, AppError, AppResult},
    models::{
        Device, DeviceUpdate, NewDevice, NewReminder, NowPlaying, Profile, Reminder,
        ReminderFilter, SpotifyConnection, SpotifyTokens, User,
    },
};

use super::Store;

const PROFILE_COLUMNS: &str = "id, username, spotify_access_token, spotify_refresh_token, \
                               spotify_user_id, created_at, updated_at";
const DEVICE_COLUMNS: &str = "id, user_id, device_id, device_name, is_online, last_seen, created_at";
const REMINDER_COLUMNS: &str = "id, user_id, device_id, title, message, reminder_time, \
                                is_recurring, recurrence_pattern, is_active, is_dismissed, \
                                created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
        username: &str,
    ) -> AppResult<(User, Profile)> {
        let mut tx = self.db.begin().await?;

        let user_id = Uuid::new_v4();
        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| on_unique_violation(e, AppError::UserAlreadyExists))?;

        let profile: Profile = sqlx::query_as(&format!(
            "INSERT INTO profiles (id, username) VALUES ($1, $2) RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .bind(username)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((user, profile))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as(&format!(
            "SELECT {} FROM profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(profile)
    }

    async fn update_username(&self, user_id: Uuid, username: &str) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as(&format!(
            "UPDATE profiles SET username = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(username)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(profile)
    }

    async fn spotify_tokens(&self, user_id: Uuid) -> AppResult<Option<SpotifyTokens>> {
        let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT spotify_access_token, spotify_refresh_token FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(match row {
            Some((Some(access_token), Some(refresh_token))) => Some(SpotifyTokens {
                access_token,
                refresh_token,
            }),
            _ => None,
        })
    }

    async fn save_spotify_connection(
        &self,
        user_id: Uuid,
        connection: &SpotifyConnection,
    ) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as(&format!(
            r#"
            UPDATE profiles
            SET spotify_access_token = $1,
                spotify_refresh_token = $2,
                spotify_user_id = $3,
                updated_at = NOW()
            WHERE id = $4
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(&connection.access_token)
        .bind(&connection.refresh_token)
        .bind(&connection.spotify_user_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(profile)
    }

    async fn update_spotify_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> AppResult<()> {
        // Only touch connected profiles so a concurrent disconnect is not undone.
        sqlx::query(
            r#"
            UPDATE profiles
            SET spotify_access_token = $1,
                spotify_refresh_token = COALESCE($2, spotify_refresh_token),
                updated_at = NOW()
            WHERE id = $3 AND spotify_refresh_token IS NOT NULL
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn clear_spotify_connection(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as(&format!(
            r#"
            UPDATE profiles
            SET spotify_access_token = NULL,
                spotify_refresh_token = NULL,
                spotify_user_id = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(profile)
    }

    async fn list_devices(&self, user_id: Uuid) -> AppResult<Vec<Device>> {
        let devices = sqlx::query_as(&format!(
            "SELECT {} FROM devices WHERE user_id = $1 ORDER BY created_at DESC",
            DEVICE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(devices)
    }

    async fn get_device(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Device>> {
        let device = sqlx::query_as(&format!(
            "SELECT {} FROM devices WHERE id = $1 AND user_id = $2",
            DEVICE_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(device)
    }

    async fn create_device(&self, user_id: Uuid, device: &NewDevice) -> AppResult<Device> {
        sqlx::query_as(&format!(
            r#"
            INSERT INTO devices (id, user_id, device_id, device_name, is_online, last_seen)
            VALUES ($1, $2, $3, $4, true, NOW())
            RETURNING {}
            "#,
            DEVICE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&device.device_id)
        .bind(&device.device_name)
        .fetch_one(&self.db)
        .await
        .map_err(|e| on_unique_violation(e, AppError::DeviceAlreadyExists))
    }

    async fn delete_device(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_devices_by_hardware_id(&self, device_id: &str) -> AppResult<Vec<Device>> {
        let devices = sqlx::query_as(&format!(
            "SELECT {} FROM devices WHERE device_id = $1 LIMIT 2",
            DEVICE_COLUMNS
        ))
        .bind(device_id)
        .fetch_all(&self.db)
        .await?;
        Ok(devices)
    }

    async fn record_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Device>> {
        let device = sqlx::query_as(&format!(
            "UPDATE devices SET last_seen = $1, is_online = true WHERE id = $2 RETURNING {}",
            DEVICE_COLUMNS
        ))
        .bind(at)
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(device)
    }

    async fn update_device(
        &self,
        id: Uuid,
        update: &DeviceUpdate,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Device>> {
        let device = sqlx::query_as(&format!(
            r#"
            UPDATE devices
            SET device_name = COALESCE($1, device_name),
                is_online = COALESCE($2, is_online),
                last_seen = CASE WHEN $2 IS TRUE THEN $3 ELSE last_seen END
            WHERE id = $4
            RETURNING {}
            "#,
            DEVICE_COLUMNS
        ))
        .bind(update.device_name.as_deref())
        .bind(update.is_online)
        .bind(at)
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(device)
    }

    async fn mark_stale_devices_offline(
        &self,
        now: DateTime<Utc>,
        offline_after: chrono::Duration,
    ) -> AppResult<Vec<Device>> {
        let cutoff = now - offline_after;
        let devices = sqlx::query_as(&format!(
            "UPDATE devices SET is_online = false WHERE is_online AND last_seen < $1 RETURNING {}",
            DEVICE_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;
        Ok(devices)
    }

    async fn list_reminders(
        &self,
        user_id: Uuid,
        filter: &ReminderFilter,
    ) -> AppResult<Vec<Reminder>> {
        let reminders = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM reminders
            WHERE user_id = $1
              AND ($2 OR is_active)
              AND ($3::uuid IS NULL OR device_id = $3)
            ORDER BY reminder_time ASC
            "#,
            REMINDER_COLUMNS
        ))
        .bind(user_id)
        .bind(filter.include_inactive)
        .bind(filter.device_id)
        .fetch_all(&self.db)
        .await?;
        Ok(reminders)
    }

    async fn pending_reminders_for_device(&self, device: Uuid) -> AppResult<Vec<Reminder>> {
        let reminders = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM reminders
            WHERE device_id = $1 AND is_active AND NOT is_dismissed
            ORDER BY reminder_time ASC
            "#,
            REMINDER_COLUMNS
        ))
        .bind(device)
        .fetch_all(&self.db)
        .await?;
        Ok(reminders)
    }

    async fn get_reminder(&self, user_id: Uuid, id: Uuid) -> AppResult<Option<Reminder>> {
        let reminder = sqlx::query_as(&format!(
            "SELECT {} FROM reminders WHERE id = $1 AND user_id = $2",
            REMINDER_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(reminder)
    }

    async fn create_reminder(&self, user_id: Uuid, reminder: &NewReminder) -> AppResult<Reminder> {
        let created = sqlx::query_as(&format!(
            r#"
            INSERT INTO reminders
                (id, user_id, device_id, title, message, reminder_time,
                 is_recurring, recurrence_pattern, is_active, is_dismissed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, true, false)
            RETURNING {}
            "#,
            REMINDER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(reminder.device_id)
        .bind(&reminder.title)
        .bind(reminder.message.as_deref())
        .bind(reminder.reminder_time)
        .bind(reminder.is_recurring)
        .bind(reminder.recurrence_pattern)
        .fetch_one(&self.db)
        .await?;
        Ok(created)
    }

    async fn save_reminder(&self, reminder: &Reminder) -> AppResult<Option<Reminder>> {
        let saved = sqlx::query_as(&format!(
            r#"
            UPDATE reminders
            SET title = $1,
                message = $2,
                reminder_time = $3,
                is_recurring = $4,
                recurrence_pattern = $5,
                is_active = $6,
                is_dismissed = $7,
                updated_at = NOW()
            WHERE id = $8 AND user_id = $9
            RETURNING {}
            "#,
            REMINDER_COLUMNS
        ))
        .bind(&reminder.title)
        .bind(reminder.message.as_deref())
        .bind(reminder.reminder_time)
        .bind(reminder.is_recurring)
        .bind(reminder.recurrence_pattern)
        .bind(reminder.is_active)
        .bind(reminder.is_dismissed)
        .bind(reminder.id)
        .bind(reminder.user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(saved)
    }

    async fn delete_reminder(&self, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_now_playing(&self, entry: &NowPlaying) -> AppResult<Option<NowPlaying>> {
        let saved = sqlx::query_as(
            r#"
            INSERT INTO now_playing (user_id, track_name, artist_name, album_name, is_playing, updated_at)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE EXISTS (
                SELECT 1 FROM profiles
                WHERE id = $1 AND spotify_refresh_token IS NOT NULL
            )
            ON CONFLICT (user_id)
            DO UPDATE SET track_name = $2, artist_name = $3, album_name = $4,
                          is_playing = $5, updated_at = $6
            RETURNING user_id, track_name, artist_name, album_name, is_playing, updated_at
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.track_name)
        .bind(&entry.artist_name)
        .bind(&entry.album_name)
        .bind(entry.is_playing)
        .bind(entry.updated_at)
        .fetch_optional(&self.db)
        .await?;
        Ok(saved)
    }

    async fn clear_now_playing(&self, user_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM now_playing WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
