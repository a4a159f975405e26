use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Cached playback snapshot, one row per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NowPlaying {
    pub user_id: Uuid,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub is_playing: bool,
    pub updated_at: DateTime<Utc>,
}

/// Stored Spotify credentials. Only produced when both tokens are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a successful authorization-code exchange, ready to persist.
#[derive(Debug, Clone)]
pub struct SpotifyConnection {
    pub access_token: String,
    pub refresh_token: String,
    pub spotify_user_id: String,
}
