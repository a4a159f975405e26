use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use super::{handlers, middleware::auth_middleware, realtime::handle_realtime};
use crate::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router<AppState> {
    // Public auth routes
    let auth_routes = Router::new()
        .route("/signup", post(handlers::auth::signup))
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/spotify/callback", get(handlers::spotify::callback));

    // Protected auth routes
    let auth_protected = Router::new()
        .route("/spotify/connect", get(handlers::spotify::connect))
        .route("/spotify/disconnect", post(handlers::spotify::disconnect))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Profile routes (protected)
    let profile_routes = Router::new()
        .route(
            "/",
            get(handlers::profile::get_profile).patch(handlers::profile::update_profile),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Owner device routes (protected)
    let device_routes = Router::new()
        .route(
            "/",
            get(handlers::devices::get_devices).post(handlers::devices::register_device),
        )
        .route("/owned/:id", delete(handlers::devices::remove_device))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Device-facing routes, keyed by hardware id
    let device_public_routes = Router::new()
        .route(
            "/:device_id",
            get(handlers::devices::heartbeat).patch(handlers::devices::update_device),
        )
        .route(
            "/:device_id/reminders",
            get(handlers::devices::device_reminders),
        );

    // Reminder routes (protected)
    let reminder_routes = Router::new()
        .route(
            "/",
            get(handlers::reminders::list_reminders).post(handlers::reminders::create_reminder),
        )
        .route(
            "/:id",
            get(handlers::reminders::get_reminder)
                .patch(handlers::reminders::update_reminder)
                .delete(handlers::reminders::delete_reminder),
        )
        .route("/:id/dismiss", post(handlers::reminders::dismiss_reminder))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Spotify routes (protected)
    let spotify_routes = Router::new()
        .route("/now-playing", get(handlers::spotify::now_playing))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // WebSocket route (protected)
    let ws_route = Router::new()
        .route("/realtime", get(handle_realtime))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .nest("/auth", auth_routes.merge(auth_protected))
        .nest("/profile", profile_routes)
        .nest("/devices", device_routes.merge(device_public_routes))
        .nest("/reminders", reminder_routes)
        .nest("/spotify", spotify_routes)
        .merge(ws_route)
        .with_state(state)
}

/// Full application: health check, the API under `/api` and the HTTP layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", create_router(state.clone()))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
