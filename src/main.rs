use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod models;
mod services;
mod spotify;
mod storage;

use api::realtime::RealtimeHub;
use config::Config;
use services::{now_playing::RefreshLocks, presence::PresenceSweeper};
use spotify::{SpotifyApi, SpotifyClient};
use storage::{postgres::PgStore, redis::RedisClient, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub spotify: Arc<dyn SpotifyApi>,
    pub realtime: Arc<RealtimeHub>,
    pub refresh_locks: Arc<RefreshLocks>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reminder_sync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::load());
    tracing::info!("Starting server in {} mode", config.server.environment);

    // Initialize database pool
    let db = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database_url())
        .await?;
    tracing::info!("Connected to PostgreSQL");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations completed");

    // Initialize Redis, used only for cross-instance change fan-out
    let redis = if config.redis.enabled {
        let redis = RedisClient::new(&config.redis_url()).await?;
        redis.ping().await?;
        tracing::info!("Connected to Redis");
        Some(redis)
    } else {
        tracing::info!("Redis disabled, realtime delivery is in-process");
        None
    };

    if config.spotify.client_credentials().is_err() {
        tracing::warn!("Spotify credentials missing, connect and now-playing will fail");
    }

    let store: Arc<dyn Store> = Arc::new(PgStore::new(db));
    let realtime = Arc::new(RealtimeHub::new(redis));

    // Spawn presence sweeper
    let sweeper = PresenceSweeper::new(store.clone(), realtime.clone(), &config.presence);
    tokio::spawn(sweeper.run());

    // Create app state
    let state = AppState {
        store,
        spotify: Arc::new(SpotifyClient::new(config.spotify.clone())?),
        realtime,
        refresh_locks: Arc::new(RefreshLocks::new()),
        config: config.clone(),
    };

    // Build router
    let app = api::router::app(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
