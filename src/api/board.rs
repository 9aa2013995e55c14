//! Project board API endpoints
//!
//! - GET/POST /api/v1/projects
//! - GET/PUT/DELETE /api/v1/projects/{id}, PUT /api/v1/projects/{id}/move
//! - GET/POST /api/v1/projects/{id}/columns, PUT/DELETE /api/v1/columns/{id},
//!   PUT /api/v1/columns/{id}/move
//! - GET/POST /api/v1/projects/{id}/lists, PUT/DELETE /api/v1/lists/{id},
//!   PUT /api/v1/lists/{id}/move
//! - GET/POST /api/v1/projects/{id}/tasks, GET/PUT/DELETE /api/v1/tasks/{id},
//!   PUT /api/v1/tasks/{id}/move

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};

use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{
    Column, CreateProjectInput, CreateTaskInput, MoveInput, NameInput, Project, Task, TaskList,
    UpdateProjectInput, UpdateTaskInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/{id}/move", put(move_project))
        .route("/projects/{id}/columns", get(list_columns).post(create_column))
        .route("/columns/{id}", put(rename_column).delete(delete_column))
        .route("/columns/{id}/move", put(move_column))
        .route("/projects/{id}/lists", get(list_lists).post(create_list))
        .route("/lists/{id}", put(rename_list).delete(delete_list))
        .route("/lists/{id}/move", put(move_list))
        .route("/projects/{id}/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(get_task).put(update_task).delete(delete_task))
        .route("/tasks/{id}/move", put(move_task))
}

// ============================================================================
// Projects
// ============================================================================

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(state.board_service.list_projects().await?))
}

async fn create_project(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateProjectInput>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let project = state.board_service.create_project(body).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.board_service.get_project(id).await?))
}

async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateProjectInput>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.board_service.update_project(id, body).await?))
}

/// DELETE /api/v1/projects/{id} - Editors only
async fn delete_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.board_service.delete_project(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<MoveInput>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.board_service.move_project(id, body).await?))
}

// ============================================================================
// Columns
// ============================================================================

async fn list_columns(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<Column>>, ApiError> {
    Ok(Json(state.board_service.list_columns(project_id).await?))
}

async fn create_column(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    ApiJson(body): ApiJson<NameInput>,
) -> Result<(StatusCode, Json<Column>), ApiError> {
    let column = state.board_service.create_column(project_id, body).await?;
    Ok((StatusCode::CREATED, Json(column)))
}

async fn rename_column(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<NameInput>,
) -> Result<Json<Column>, ApiError> {
    Ok(Json(state.board_service.rename_column(id, body).await?))
}

async fn delete_column(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.board_service.delete_column(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_column(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<MoveInput>,
) -> Result<Json<Column>, ApiError> {
    Ok(Json(state.board_service.move_column(id, body).await?))
}

// ============================================================================
// Lists
// ============================================================================

async fn list_lists(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<TaskList>>, ApiError> {
    Ok(Json(state.board_service.list_lists(project_id).await?))
}

async fn create_list(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    ApiJson(body): ApiJson<NameInput>,
) -> Result<(StatusCode, Json<TaskList>), ApiError> {
    let list = state.board_service.create_list(project_id, body).await?;
    Ok((StatusCode::CREATED, Json(list)))
}

async fn rename_list(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<NameInput>,
) -> Result<Json<TaskList>, ApiError> {
    Ok(Json(state.board_service.rename_list(id, body).await?))
}

async fn delete_list(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.board_service.delete_list(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_list(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<MoveInput>,
) -> Result<Json<TaskList>, ApiError> {
    Ok(Json(state.board_service.move_list(id, body).await?))
}

// ============================================================================
// Tasks
// ============================================================================

async fn list_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.board_service.list_tasks(project_id).await?))
}

async fn create_task(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    ApiJson(body): ApiJson<CreateTaskInput>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state.board_service.create_task(project_id, body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.board_service.get_task(id).await?))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateTaskInput>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.board_service.update_task(id, body).await?))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.board_service.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/tasks/{id}/move - Body: `{ dest_index, column_id? }`
async fn move_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<MoveInput>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.board_service.move_task(id, body).await?))
}
