//! Analytics API
//!
//! - GET /api/v1/analytics/summary

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState};
use crate::services::AnalyticsSummary;

pub fn router() -> Router<AppState> {
    Router::new().route("/analytics/summary", get(summary))
}

async fn summary(State(state): State<AppState>) -> Result<Json<AnalyticsSummary>, ApiError> {
    Ok(Json(state.analytics_service.summary().await?))
}
