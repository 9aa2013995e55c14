//! API middleware
//!
//! Contains:
//! - shared application state
//! - the JSON error type and service error conversions
//! - session authentication and admin authorization

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::AuthConfig;
use crate::db::repositories::{
    SqlxApprovalRepository, SqlxBoardRepository, SqlxContentRepository, SqlxSessionRepository,
    SqlxTaskRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    AnalyticsService, ApprovalService, ApprovalServiceError, BoardService, BoardServiceError,
    ContentService, ContentServiceError, EmailQueue, KeyedLocks, NotificationService,
    UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub content_service: Arc<ContentService>,
    pub approval_service: Arc<ApprovalService>,
    pub board_service: Arc<BoardService>,
    pub analytics_service: Arc<AnalyticsService>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(
        pool: DynDatabasePool,
        cache: Arc<Cache>,
        queue: Arc<EmailQueue>,
        auth: &AuthConfig,
    ) -> Self {
        let users = SqlxUserRepository::boxed(pool.clone());
        let contents = SqlxContentRepository::boxed(pool.clone());
        let approvals = SqlxApprovalRepository::boxed(pool.clone());
        let locks = Arc::new(KeyedLocks::new());
        let notifications = Arc::new(NotificationService::new(queue, users.clone()));

        let user_service = Arc::new(UserService::new(
            users.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            auth,
        ));
        let content_service = Arc::new(ContentService::new(
            contents.clone(),
            locks.clone(),
            cache.clone(),
            notifications.clone(),
        ));
        let approval_service = Arc::new(ApprovalService::new(
            contents.clone(),
            approvals.clone(),
            users.clone(),
            locks,
            cache.clone(),
            notifications,
        ));
        let board_service = Arc::new(BoardService::new(
            SqlxBoardRepository::boxed(pool.clone()),
            SqlxTaskRepository::boxed(pool.clone()),
            users,
        ));
        let analytics_service = Arc::new(AnalyticsService::new(contents, approvals, cache));

        Self {
            pool,
            user_service,
            content_service,
            approval_service,
            board_service,
            analytics_service,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// JSON body extractor whose rejections use the `ApiError` envelope
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self.error.message);
        }
        (status, Json(self)).into_response()
    }
}

impl From<ContentServiceError> for ApiError {
    fn from(e: ContentServiceError) -> Self {
        match e {
            ContentServiceError::NotFound(id) => {
                ApiError::not_found(format!("Content not found: {}", id))
            }
            ContentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ContentServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ContentServiceError::InvalidTransition(msg) => ApiError::conflict(msg),
            ContentServiceError::DuplicateSlug(slug) => ApiError::with_details(
                "CONFLICT",
                format!("Content slug already exists: {}", slug),
                serde_json::json!({"field": "slug", "value": slug}),
            ),
            ContentServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<ApprovalServiceError> for ApiError {
    fn from(e: ApprovalServiceError) -> Self {
        match e {
            ApprovalServiceError::NotFound(what) => {
                ApiError::not_found(format!("Not found: {}", what))
            }
            ApprovalServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ApprovalServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ApprovalServiceError::InvalidTransition(msg) => ApiError::conflict(msg),
            ApprovalServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<BoardServiceError> for ApiError {
    fn from(e: BoardServiceError) -> Self {
        match e {
            BoardServiceError::NotFound(what) => ApiError::not_found(format!("Not found: {}", what)),
            BoardServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            BoardServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            BoardServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::Unauthorized(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::NotFound(id) => ApiError::not_found(format!("User not found: {}", id)),
            UserServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation_error(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::internal_error(format!("{:#}", e))
    }
}

/// Extract the session token from `Authorization: Bearer` or the `session` cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    tracing::debug!(user_id = user.id, "Request authenticated");
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware. Runs after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let headers = headers(header::AUTHORIZATION, "Bearer test-token-123");
        assert_eq!(extract_session_token(&headers), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let headers = headers(header::COOKIE, "theme=dark; session=test-token-456");
        assert_eq!(extract_session_token(&headers), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let mut headers = headers(header::AUTHORIZATION, "Bearer bearer-token");
        headers.insert(header::COOKIE, HeaderValue::from_static("session=cookie-token"));
        assert_eq!(extract_session_token(&headers), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        let basic = headers(header::AUTHORIZATION, "Basic invalid");
        assert!(extract_session_token(&basic).is_none());
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::internal_error("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_service_errors_map_to_status() {
        let transition: ApiError = ContentServiceError::InvalidTransition("no".into()).into();
        assert_eq!(transition.status(), StatusCode::CONFLICT);

        let slug: ApiError = ContentServiceError::DuplicateSlug("taken".into()).into();
        assert_eq!(slug.status(), StatusCode::CONFLICT);
        assert_eq!(slug.error.details, Some(serde_json::json!({"field": "slug", "value": "taken"})));

        let missing: ApiError = ApprovalServiceError::NotFound("approval 3".into()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let forbidden: ApiError = BoardServiceError::Forbidden("no".into()).into();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let secret: ApiError = UserServiceError::Unauthorized("bad secret".into()).into();
        assert_eq!(secret.status(), StatusCode::UNAUTHORIZED);

        let internal: ApiError = anyhow::anyhow!("db down").into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
