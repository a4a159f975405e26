use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Login identity. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub spotify_access_token: Option<String>,
    pub spotify_refresh_token: Option<String>,
    pub spotify_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn spotify_connected(&self) -> bool {
        self.spotify_access_token.is_some() && self.spotify_refresh_token.is_some()
    }

    pub fn view(&self) -> ProfileView {
        ProfileView {
            id: self.id,
            username: self.username.clone(),
            spotify_connected: self.spotify_connected(),
            spotify_user_id: self.spotify_user_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Client-facing profile, without integration credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileView {
    pub id: Uuid,
    pub username: String,
    pub spotify_connected: bool,
    pub spotify_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;

pub fn validate_username(username: &str) -> Result<&str, String> {
    let trimmed = username.trim();
    let len = trimmed.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(format!(
            "username must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        ));
    }
    Ok(trimmed)
}
