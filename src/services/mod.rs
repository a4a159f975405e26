pub mod auth;
pub mod devices;
pub mod now_playing;
pub mod presence;
pub mod reminders;
pub mod spotify_auth;
