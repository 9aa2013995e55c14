//! Content API endpoints
//!
//! - GET /api/v1/contents - Filtered, paginated list
//! - POST /api/v1/contents - Create a draft
//! - GET/PUT/DELETE /api/v1/contents/{id}
//! - POST /api/v1/contents/{id}/submit - Start a review round
//! - POST /api/v1/contents/{id}/publish
//! - POST /api/v1/contents/{id}/withdraw - Back to draft
//! - GET /api/v1/search - Full-text search

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::PageResponse;
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{
    Approval, Content, ContentFilter, ContentStatus, CreateContentInput, ListParams,
    UpdateContentInput,
};

/// Query parameters for listing content
#[derive(Debug, Deserialize)]
pub struct ListContentsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<ContentStatus>,
    pub author_id: Option<i64>,
    pub q: Option<String>,
}

/// Query parameters for search
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub status: Option<ContentStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Request body for submitting content for review
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub reviewer_ids: Vec<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/contents", get(list_contents).post(create_content))
        .route(
            "/contents/{id}",
            get(get_content).put(update_content).delete(delete_content),
        )
        .route("/contents/{id}/submit", post(submit_content))
        .route("/contents/{id}/publish", post(publish_content))
        .route("/contents/{id}/withdraw", post(withdraw_content))
        .route("/search", get(search_contents))
}

/// GET /api/v1/contents
async fn list_contents(
    State(state): State<AppState>,
    Query(query): Query<ListContentsQuery>,
) -> Result<Json<PageResponse<Content>>, ApiError> {
    let params = ListParams::from_query(query.page, query.per_page);
    let filter = ContentFilter {
        status: query.status,
        author_id: query.author_id,
        q: query.q,
    };
    let result = state.content_service.list(&filter, &params).await?;
    Ok(Json(result.into()))
}

/// POST /api/v1/contents
async fn create_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<CreateContentInput>,
) -> Result<(StatusCode, Json<Content>), ApiError> {
    let content = state.content_service.create(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(content)))
}

/// GET /api/v1/contents/{id}
async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Content>, ApiError> {
    Ok(Json(state.content_service.get(id).await?))
}

/// PUT /api/v1/contents/{id}
async fn update_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateContentInput>,
) -> Result<Json<Content>, ApiError> {
    Ok(Json(state.content_service.update(&user.0, id, body).await?))
}

/// DELETE /api/v1/contents/{id}
async fn delete_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.content_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/contents/{id}/submit
async fn submit_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<SubmitRequest>,
) -> Result<Json<Vec<Approval>>, ApiError> {
    let approvals = state
        .approval_service
        .submit_for_review(&user.0, id, &body.reviewer_ids)
        .await?;
    Ok(Json(approvals))
}

/// POST /api/v1/contents/{id}/publish
async fn publish_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Content>, ApiError> {
    Ok(Json(state.content_service.publish(&user.0, id).await?))
}

/// POST /api/v1/contents/{id}/withdraw
async fn withdraw_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Content>, ApiError> {
    Ok(Json(state.content_service.withdraw(&user.0, id).await?))
}

/// GET /api/v1/search?q=...
async fn search_contents(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PageResponse<Content>>, ApiError> {
    let params = ListParams::from_query(query.page, query.per_page);
    let result = state
        .content_service
        .search(&query.q, query.status, &params)
        .await?;
    Ok(Json(result.into()))
}
