use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub spotify: SpotifyConfig,
    pub app: AppConfig,
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub session_ttl: Duration,
    pub issuer: String,
    pub bcrypt_cost: u32,
}

/// Spotify integration settings. Credentials are optional at startup and
/// checked where they are needed.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub accounts_url: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub frontend_url: String,
}

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub offline_after: Duration,
    pub sweep_interval: Duration,
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("SERVER_PORT", 8080),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            },
            database: DatabaseConfig {
                host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: parsed("DB_PORT", 5432),
                user: env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
                password: env::var("DB_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
                database: env::var("DB_NAME").unwrap_or_else(|_| "reminder_sync".to_string()),
                ssl_mode: env::var("DB_SSL_MODE").unwrap_or_else(|_| "disable".to_string()),
                max_connections: parsed("DB_MAX_CONNS", 10),
            },
            redis: RedisConfig {
                enabled: parsed("REDIS_ENABLED", true),
                host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: parsed("REDIS_PORT", 6379),
                password: non_empty("REDIS_PASSWORD"),
                db: parsed("REDIS_DB", 0),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "reminder-sync-dev-secret-change-me".to_string()),
                session_ttl: Duration::from_secs(parsed("JWT_SESSION_TTL", 7 * 24 * 60 * 60)), // 7 days
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "reminder-sync".to_string()),
                bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST),
            },
            spotify: SpotifyConfig {
                client_id: non_empty("SPOTIFY_CLIENT_ID"),
                client_secret: non_empty("SPOTIFY_CLIENT_SECRET"),
                redirect_uri: non_empty("SPOTIFY_REDIRECT_URI"),
                accounts_url: env::var("SPOTIFY_ACCOUNTS_URL")
                    .unwrap_or_else(|_| "https://accounts.spotify.com".to_string()),
                api_url: env::var("SPOTIFY_API_URL")
                    .unwrap_or_else(|_| "https://api.spotify.com".to_string()),
            },
            app: AppConfig {
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            presence: PresenceConfig {
                offline_after: Duration::from_secs(parsed("DEVICE_OFFLINE_AFTER", 5 * 60)),
                sweep_interval: Duration::from_secs(parsed("DEVICE_SWEEP_INTERVAL", 60)),
            },
        }
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.database.user,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database,
            self.database.ssl_mode
        )
    }

    pub fn redis_url(&self) -> String {
        match &self.redis.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis.host, self.redis.port, self.redis.db
            ),
            None => format!(
                "redis://{}:{}/{}",
                self.redis.host, self.redis.port, self.redis.db
            ),
        }
    }

    /// Settings page URL with a single query flag, used by the OAuth redirects.
    pub fn settings_url(&self, key: &str, value: &str) -> String {
        format!(
            "{}/settings?{}={}",
            self.app.frontend_url.trim_end_matches('/'),
            key,
            value
        )
    }
}

impl SpotifyConfig {
    /// Client id and redirect URI, required before sending a user to Spotify.
    pub fn authorize_params(&self) -> AppResult<(&str, &str)> {
        match (&self.client_id, &self.redirect_uri) {
            (Some(id), Some(uri)) => Ok((id, uri)),
            _ => Err(AppError::Configuration(
                "SPOTIFY_CLIENT_ID and SPOTIFY_REDIRECT_URI must be set".to_string(),
            )),
        }
    }

    /// Client id and secret, required for the token endpoint.
    pub fn client_credentials(&self) -> AppResult<(&str, &str)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(AppError::Configuration(
                "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set".to_string(),
            )),
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                database: "reminder_sync_test".to_string(),
                ssl_mode: "disable".to_string(),
                max_connections: 1,
            },
            redis: RedisConfig {
                enabled: false,
                host: "localhost".to_string(),
                port: 6379,
                password: None,
                db: 0,
            },
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                session_ttl: Duration::from_secs(3600),
                issuer: "reminder-sync".to_string(),
                bcrypt_cost: 4,
            },
            spotify: SpotifyConfig {
                client_id: Some("client-id".to_string()),
                client_secret: Some("client-secret".to_string()),
                redirect_uri: Some("http://localhost:8080/api/auth/spotify/callback".to_string()),
                accounts_url: "https://accounts.spotify.test".to_string(),
                api_url: "https://api.spotify.test".to_string(),
            },
            app: AppConfig {
                frontend_url: "http://localhost:3000".to_string(),
            },
            presence: PresenceConfig {
                offline_after: Duration::from_secs(300),
                sweep_interval: Duration::from_secs(60),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_redirect_uri_is_a_configuration_error() {
        let mut config = Config::for_tests().spotify;
        config.redirect_uri = None;

        assert!(matches!(
            config.authorize_params(),
            Err(AppError::Configuration(_))
        ));
        assert!(config.client_credentials().is_ok());
    }

    #[test]
    fn settings_url_strips_trailing_slash() {
        let mut config = Config::for_tests();
        config.app.frontend_url = "https://dash.example.com/".to_string();

        assert_eq!(
            config.settings_url("error", "spotify_auth_failed"),
            "https://dash.example.com/settings?error=spotify_auth_failed"
        );
    }
}
