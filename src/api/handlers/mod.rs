pub mod auth;
pub mod devices;
pub mod profile;
pub mod reminders;
pub mod spotify;

use serde::Serialize;

/// Body of endpoints that only confirm an action.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
