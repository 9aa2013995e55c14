//! Admin API endpoints
//!
//! - GET /api/v1/admin/users - Paginated user list
//! - PUT /api/v1/admin/users/{id}/role - Change a user's role

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{User, UserRole};

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}/role", put(update_role))
}

/// GET /api/v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<User>>, ApiError> {
    let result = state.user_service.list(&query.params()).await?;
    Ok(Json(result.into()))
}

/// PUT /api/v1/admin/users/{id}/role
async fn update_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateRoleRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.set_role(&user.0, id, body.role).await?))
}
