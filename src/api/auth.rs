//! Session endpoints
//!
//! - POST /api/v1/identity/sessions - Identity provider opens a session
//! - GET /api/v1/auth/me - Current user
//! - DELETE /api/v1/auth/session - Logout

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::middleware::{
    extract_session_token, ApiError, ApiJson, AppState, AuthenticatedUser,
};
use crate::models::{ProvisionUserInput, User};
use crate::services::IssuedSession;

/// Header carrying the shared identity provider secret
pub const PROVIDER_SECRET_HEADER: &str = "x-provider-secret";

/// Routes called by the identity provider
pub fn identity_router() -> Router<AppState> {
    Router::new().route("/identity/sessions", post(open_session))
}

/// Routes that need a session
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/session", delete(logout))
}

/// POST /api/v1/identity/sessions
///
/// Upserts the user by subject and returns a fresh session token.
async fn open_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<ProvisionUserInput>,
) -> Result<(StatusCode, Json<IssuedSession>), ApiError> {
    let secret = headers
        .get(PROVIDER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    let session = state.user_service.open_session(secret, body).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/auth/me
async fn me(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

/// DELETE /api/v1/auth/session
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    if let Some(token) = extract_session_token(&headers) {
        state.user_service.logout(&token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}
