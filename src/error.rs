use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    // Auth errors
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Unauthorized")]
    Unauthorized,

    // Account errors
    #[error("User already exists")]
    UserAlreadyExists,
    #[error("Profile not found")]
    ProfileNotFound,

    // Device errors
    #[error("Device not found")]
    DeviceNotFound,
    #[error("Device already registered")]
    DeviceAlreadyExists,

    // Reminder errors
    #[error("Reminder not found")]
    ReminderNotFound,

    // Spotify errors
    #[error("Spotify not connected")]
    NotConnected,
    #[error("Spotify authorization failed: {0}")]
    UpstreamAuth(String),
    #[error("Spotify request failed: {0}")]
    Upstream(String),
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Bad request: {0}")]
    BadRequest(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    // JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    // Outbound HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // 400 Bad Request
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotConnected => (StatusCode::BAD_REQUEST, self.to_string()),

            // 401 Unauthorized
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),

            // 404 Not Found
            AppError::ProfileNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::DeviceNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::ReminderNotFound => (StatusCode::NOT_FOUND, self.to_string()),

            // 409 Conflict
            AppError::UserAlreadyExists => (StatusCode::CONFLICT, self.to_string()),
            AppError::DeviceAlreadyExists => (StatusCode::CONFLICT, self.to_string()),

            // 502 Bad Gateway
            AppError::UpstreamAuth(reason) => {
                tracing::warn!("Spotify authorization failed: {}", reason);
                (
                    StatusCode::BAD_GATEWAY,
                    "Spotify authorization failed, reconnect Spotify".to_string(),
                )
            }
            AppError::Upstream(reason) => {
                tracing::warn!("Spotify request failed: {}", reason);
                (
                    StatusCode::BAD_GATEWAY,
                    "Failed to fetch now playing".to_string(),
                )
            }
            AppError::Http(e) => {
                tracing::warn!("Outbound HTTP error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream service unavailable".to_string(),
                )
            }

            // 500 Internal Server Error
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Integration is not configured".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Maps a unique-constraint violation to `conflict`, passing other errors through.
pub fn on_unique_violation(err: sqlx::Error, conflict: AppError) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => conflict,
        _ => AppError::Database(err),
    }
}
