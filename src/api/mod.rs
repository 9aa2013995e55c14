//! API layer - HTTP handlers and routing
//!
//! Everything is served under `/api/v1`:
//! - public: health and the identity provider hook
//! - authenticated: session, content, search, approvals, analytics, board
//! - admin: user management

pub mod admin;
pub mod analytics;
pub mod approvals;
pub mod auth;
pub mod board;
pub mod common;
pub mod contents;
pub mod health;
pub mod middleware;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let admin_routes = admin::router()
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let protected_routes = Router::new()
        .merge(auth::protected_router())
        .merge(contents::router())
        .merge(approvals::router())
        .merge(analytics::router())
        .merge(board::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .merge(health::router())
        .merge(auth::identity_router())
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with CORS and request tracing
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::COOKIE,
            HeaderName::from_static(auth::PROVIDER_SECRET_HEADER),
        ]);

    if origin == "*" {
        return cors.allow_origin(AllowOrigin::any());
    }
    match origin.parse::<HeaderValue>() {
        // Cookie sessions need credentials, which require an exact origin
        Ok(origin) => cors.allow_origin(origin).allow_credentials(true),
        Err(e) => {
            tracing::warn!("Invalid CORS origin '{}': {}; cross-origin requests disabled", origin, e);
            cors
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::{AuthConfig, CacheConfig};
    use crate::db::{create_test_pool, migrations};
    use crate::services::email::{EmailQueue, LogMailer};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "provider-secret";

    async fn test_app() -> Router {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let auth = AuthConfig {
            provider_secret: Some(SECRET.to_string()),
            session_ttl_hours: 1,
        };
        let queue = Arc::new(EmailQueue::new(Arc::new(LogMailer), 3));
        let state = AppState::new(pool, create_cache(&CacheConfig::default()), queue, &auth);
        build_router(state, "http://localhost:3000")
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Open a session through the identity hook; returns (token, user id)
    async fn login(app: &Router, name: &str, role: &str) -> (String, i64) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/identity/sessions")
            .header(header::CONTENT_TYPE, "application/json")
            .header(auth::PROVIDER_SECRET_HEADER, SECRET)
            .body(Body::from(
                json!({
                    "subject": format!("idp|{}", name),
                    "username": name,
                    "email": format!("{}@example.com", name),
                    "role": role,
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_i64().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_envelope() {
        let app = test_app().await;
        let (token, _) = login(&app, "eve", "editor").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/approvals/bulk",
            Some(&token),
            Some(json!({"content_ids": [1]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"].as_str().unwrap().contains("action"));

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/approvals/bulk",
            Some(&token),
            Some(json!({"action": "maybe", "content_ids": [1]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/projects",
            Some(&token),
            Some(json!({"name": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_identity_requires_secret() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/identity/sessions",
            None,
            Some(json!({"subject": "x", "username": "x", "email": "x@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = test_app().await;
        let (status, _) = send(&app, Method::GET, "/api/v1/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (token, _) = login(&app, "ann", "author").await;
        let (status, me) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "ann");
        assert_eq!(me["role"], "author");

        let (status, _) =
            send(&app, Method::DELETE, "/api/v1/auth/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_review_workflow_over_http() {
        let app = test_app().await;
        let (author, _) = login(&app, "ann", "author").await;
        let (reviewer, reviewer_id) = login(&app, "rex", "reviewer").await;
        let (editor, _) = login(&app, "eve", "editor").await;

        let (status, content) = send(
            &app,
            Method::POST,
            "/api/v1/contents",
            Some(&author),
            Some(json!({"title": "Launch notes", "body": "We *ship*."})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(content["status"], "draft");
        assert_eq!(content["slug"], "launch-notes");
        let id = content["id"].as_i64().unwrap();

        let (status, approvals) = send(
            &app,
            Method::POST,
            &format!("/api/v1/contents/{}/submit", id),
            Some(&author),
            Some(json!({"reviewer_ids": [reviewer_id]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approvals.as_array().unwrap().len(), 1);

        let (_, mine) = send(&app, Method::GET, "/api/v1/approvals/mine", Some(&reviewer), None).await;
        let approval_id = mine[0]["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/approvals/{}", approval_id),
            Some(&reviewer),
            Some(json!({"status": "rejected"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, verdict) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/approvals/{}", approval_id),
            Some(&reviewer),
            Some(json!({"status": "approved", "comment": "lgtm"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verdict["status"], "approved");

        let (_, content) = send(&app, Method::GET, &format!("/api/v1/contents/{}", id), Some(&author), None).await;
        assert_eq!(content["status"], "approved");

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/contents/{}", id),
            Some(&author),
            Some(json!({"title": "Late change"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, Method::POST, &format!("/api/v1/contents/{}/publish", id), Some(&author), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, published) = send(&app, Method::POST, &format!("/api/v1/contents/{}/publish", id), Some(&editor), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(published["status"], "published");
        assert!(published["published_at"].is_string());

        let (status, summary) = send(&app, Method::GET, "/api/v1/analytics/summary", Some(&editor), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["total_contents"], 1);
        assert_eq!(summary["contents_by_status"]["published"], 1);
    }

    #[tokio::test]
    async fn test_search_and_listing() {
        let app = test_app().await;
        let (author, author_id) = login(&app, "ann", "author").await;
        for title in ["Quarterly report", "Holiday schedule", "Report archive"] {
            send(&app, Method::POST, "/api/v1/contents", Some(&author), Some(json!({"title": title}))).await;
        }

        let (status, found) = send(&app, Method::GET, "/api/v1/search?q=REPORT", Some(&author), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["total"], 2);

        let (status, _) = send(&app, Method::GET, "/api/v1/search?q=", Some(&author), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, page) = send(
            &app,
            Method::GET,
            &format!("/api/v1/contents?status=draft&author_id={}&per_page=2", author_id),
            Some(&author),
            None,
        )
        .await;
        assert_eq!(page["total"], 3);
        assert_eq!(page["items"].as_array().unwrap().len(), 2);
        assert_eq!(page["total_pages"], 2);
    }

    #[tokio::test]
    async fn test_admin_routes_need_admin() {
        let app = test_app().await;
        let (author, author_id) = login(&app, "ann", "author").await;
        let (admin, _) = login(&app, "ada", "admin").await;

        let (status, _) = send(&app, Method::GET, "/api/v1/admin/users", Some(&author), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, users) = send(&app, Method::GET, "/api/v1/admin/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users["total"], 2);

        let (status, promoted) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/admin/users/{}/role", author_id),
            Some(&admin),
            Some(json!({"role": "editor"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(promoted["role"], "editor");
    }

    #[tokio::test]
    async fn test_board_over_http() {
        let app = test_app().await;
        let (token, _) = login(&app, "ann", "author").await;

        let (status, project) = send(&app, Method::POST, "/api/v1/projects", Some(&token), Some(json!({"name": "Site"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let pid = project["id"].as_i64().unwrap();

        let (_, todo) = send(&app, Method::POST, &format!("/api/v1/projects/{}/columns", pid), Some(&token), Some(json!({"name": "Todo"}))).await;
        let column_id = todo["id"].as_i64().unwrap();

        let mut task_ids = Vec::new();
        for title in ["a", "b", "c"] {
            let (_, task) = send(
                &app,
                Method::POST,
                &format!("/api/v1/projects/{}/tasks", pid),
                Some(&token),
                Some(json!({"column_id": column_id, "title": title})),
            )
            .await;
            task_ids.push(task["id"].as_i64().unwrap());
        }

        let (status, moved) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/tasks/{}/move", task_ids[2]),
            Some(&token),
            Some(json!({"dest_index": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["status_order"], 500);

        let (_, tasks) = send(&app, Method::GET, &format!("/api/v1/projects/{}/tasks", pid), Some(&token), None).await;
        let order: Vec<i64> = tasks
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![task_ids[0], task_ids[2], task_ids[1]]);

        let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/projects/{}", pid), Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::GET, "/api/v1/tasks/9999", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
