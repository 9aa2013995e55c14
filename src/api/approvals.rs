//! Approval API endpoints
//!
//! - GET /api/v1/contents/{id}/approvals - Approvals of one content item
//! - POST /api/v1/contents/{id}/approvals - Invite a reviewer
//! - GET /api/v1/approvals/mine - Pending approvals of the current reviewer
//! - GET /api/v1/approvals/{id}
//! - PUT /api/v1/approvals/{id} - Submit a verdict
//! - POST /api/v1/approvals/bulk - Approve or reject many items

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{
    Approval, BulkApprovalInput, BulkApprovalResult, InviteReviewerInput, VerdictInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/contents/{id}/approvals",
            get(list_content_approvals).post(invite_reviewer),
        )
        .route("/approvals/mine", get(my_approvals))
        .route("/approvals/bulk", post(bulk_action))
        .route("/approvals/{id}", get(get_approval).put(submit_verdict))
}

/// GET /api/v1/contents/{id}/approvals
async fn list_content_approvals(
    State(state): State<AppState>,
    Path(content_id): Path<i64>,
) -> Result<Json<Vec<Approval>>, ApiError> {
    Ok(Json(state.approval_service.list_for_content(content_id).await?))
}

/// POST /api/v1/contents/{id}/approvals
async fn invite_reviewer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(content_id): Path<i64>,
    ApiJson(body): ApiJson<InviteReviewerInput>,
) -> Result<(StatusCode, Json<Approval>), ApiError> {
    let approval = state
        .approval_service
        .invite_reviewer(&user.0, content_id, body.reviewer_id)
        .await?;
    Ok((StatusCode::CREATED, Json(approval)))
}

/// GET /api/v1/approvals/mine
async fn my_approvals(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Approval>>, ApiError> {
    Ok(Json(state.approval_service.list_mine(&user.0).await?))
}

/// GET /api/v1/approvals/{id}
async fn get_approval(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Approval>, ApiError> {
    Ok(Json(state.approval_service.get(id).await?))
}

/// PUT /api/v1/approvals/{id}
async fn submit_verdict(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<VerdictInput>,
) -> Result<Json<Approval>, ApiError> {
    Ok(Json(state.approval_service.submit_verdict(&user.0, id, body).await?))
}

/// POST /api/v1/approvals/bulk
///
/// Always 200 once the request itself is valid; per-item failures are
/// listed in the body.
async fn bulk_action(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<BulkApprovalInput>,
) -> Result<Json<BulkApprovalResult>, ApiError> {
    Ok(Json(state.approval_service.bulk_action(&user.0, body).await?))
}
