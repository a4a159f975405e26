use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Cookie, HeaderMapExt};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    services::auth::{AuthService, Claims},
    AppState,
};

pub const SESSION_COOKIE: &str = "session";

/// Authentication middleware. Accepts a Bearer token or the session cookie.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(&request).ok_or(AppError::Unauthorized)?;

    let auth_service = AuthService::new(state.store.clone(), state.config.clone());
    let claims = auth_service.validate_token(&token)?;

    // Insert claims into request extensions
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

fn session_token(request: &Request) -> Option<String> {
    let headers = request.headers();

    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    bearer.or_else(|| {
        headers
            .typed_get::<Cookie>()
            .and_then(|cookie| cookie.get(SESSION_COOKIE).map(str::to_string))
    })
}

/// Extract user_id from request extensions
pub fn get_user_id(claims: &Claims) -> AppResult<Uuid> {
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)
}
