use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::Deserialize;
use tracing::{error, warn};

use super::auth::{self, AuthUser};
use super::db::DbHandle;
#[cfg(test)]
use super::db::TaskDb;
use crate::models::{NewTask, Task, TaskPatch, TaskStatus};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub session_ttl: chrono::Duration,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

/// Status travels as a plain string so an unknown value is a 400 with our
/// message rather than a body rejection.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
    pub status: Option<String>,
    pub position: Option<i64>,
}

impl UpdateTaskRequest {
    fn into_patch(self) -> Result<TaskPatch, ApiError> {
        let status = self
            .status
            .as_deref()
            .map(TaskStatus::from_str)
            .transpose()
            .map_err(ApiError::BadRequest)?;
        let patch = TaskPatch {
            title: self.title,
            description: self.description,
            assigned_to: self.assigned_to,
            status,
            position: self.position,
        };
        patch.validate().map_err(ApiError::BadRequest)?;
        Ok(patch)
    }
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                error!("request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", e))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", put(update_task).delete(delete_task))
        .route("/api/tasks/{id}/status", patch(update_task_status))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_tasks(
    State(state): State<SharedState>,
    _auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = state.db.call(move |db| db.list_tasks()).await?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(ApiError::BadRequest)?;
    let created_by = auth.user.id;
    let task = state
        .db
        .call(move |db| db.create_task(&created_by, &req))
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let patch = req.into_patch().inspect_err(|e| warn!(task = %id, "rejected update: {:?}", e))?;
    apply_patch(&state, id, patch).await
}

async fn update_task_status(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = TaskStatus::from_str(&req.status).map_err(ApiError::BadRequest)?;
    let patch = TaskPatch {
        status: Some(status),
        ..TaskPatch::default()
    };
    apply_patch(&state, id, patch).await
}

async fn apply_patch(
    state: &SharedState,
    id: String,
    patch: TaskPatch,
) -> Result<Json<Task>, ApiError> {
    let lookup = id.clone();
    let task = state
        .db
        .call(move |db| db.update_task(&lookup, &patch))
        .await?;
    match task {
        Some(task) => Ok(Json(task)),
        None => Err(ApiError::NotFound(format!("Task {} not found", id))),
    }
}

async fn delete_task(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = id.clone();
    let deleted = state.db.call(move |db| db.delete_task(&lookup)).await?;
    match deleted {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(ApiError::NotFound(format!("Task {} not found", id))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let db = TaskDb::new_in_memory().unwrap();
        let state = Arc::new(AppState {
            db: DbHandle::new(db),
            session_ttl: chrono::Duration::hours(1),
        });
        api_router().with_state(state)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn register(app: &Router, username: &str) -> String {
        let request = json_request(
            "POST",
            "/api/auth/register",
            None,
            serde_json::json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "hunter22",
            }),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: serde_json::Value = body_json(response.into_body()).await;
        body["token"].as_str().unwrap().to_string()
    }

    async fn create(app: &Router, token: &str, title: &str) -> serde_json::Value {
        let request = json_request(
            "POST",
            "/api/tasks",
            Some(token),
            serde_json::json!({"title": title, "description": "desc", "assignedTo": "alice"}),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response.into_body()).await
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let response = app.oneshot(empty_request("GET", "/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_tasks_require_a_token() {
        let app = test_app();
        let response = app
            .clone()
            .oneshot(empty_request("GET", "/api/tasks", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("token"));

        let response = app
            .oneshot(empty_request("GET", "/api/tasks", Some("bogus")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_ignores_supplied_status() {
        let app = test_app();
        let token = register(&app, "alice").await;

        let request = json_request(
            "POST",
            "/api/tasks",
            Some(&token),
            serde_json::json!({
                "title": "Fix bug",
                "description": "desc",
                "assignedTo": "alice",
                "status": "Completed",
            }),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let task: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(task["status"], "To Do");
        assert_eq!(task["title"], "Fix bug");
        assert_eq!(task["assignedTo"], "alice");

        let me = app
            .oneshot(empty_request("GET", "/api/auth/me", Some(&token)))
            .await
            .unwrap();
        let user: serde_json::Value = body_json(me.into_body()).await;
        assert_eq!(task["createdBy"], user["id"]);
    }

    #[tokio::test]
    async fn test_create_requires_title_and_description() {
        let app = test_app();
        let token = register(&app, "alice").await;

        let request = json_request(
            "POST",
            "/api/tasks",
            Some(&token),
            serde_json::json!({"title": "", "description": "desc"}),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = json_request(
            "POST",
            "/api/tasks",
            Some(&token),
            serde_json::json!({"title": "Fix bug"}),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("description"));
    }

    #[tokio::test]
    async fn test_list_returns_created_tasks_in_order() {
        let app = test_app();
        let token = register(&app, "alice").await;
        create(&app, &token, "First").await;
        create(&app, &token, "Second").await;

        let response = app
            .oneshot(empty_request("GET", "/api/tasks", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tasks: Vec<serde_json::Value> = body_json(response.into_body()).await;
        let titles: Vec<&str> = tasks.iter().map(|t| t["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_update_task_fields_and_status() {
        let app = test_app();
        let token = register(&app, "alice").await;
        let task = create(&app, &token, "Old").await;
        let uri = format!("/api/tasks/{}", task["id"].as_str().unwrap());

        let request = json_request(
            "PUT",
            &uri,
            Some(&token),
            serde_json::json!({"title": "New", "status": "In Progress"}),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(updated["title"], "New");
        assert_eq!(updated["description"], "desc");
        assert_eq!(updated["status"], "In Progress");
    }

    #[tokio::test]
    async fn test_update_unknown_task_is_not_found() {
        let app = test_app();
        let token = register(&app, "alice").await;

        let request = json_request(
            "PUT",
            "/api/tasks/no-such-task",
            Some(&token),
            serde_json::json!({"title": "x"}),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_status() {
        let app = test_app();
        let token = register(&app, "alice").await;
        let task = create(&app, &token, "Task").await;
        let uri = format!("/api/tasks/{}", task["id"].as_str().unwrap());

        let request = json_request("PUT", &uri, Some(&token), serde_json::json!({"status": "done"}));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["error"], "Invalid status: done");

        let request = json_request("PUT", &uri, Some(&token), serde_json::json!({"title": " "}));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_patch_status_route() {
        let app = test_app();
        let token = register(&app, "alice").await;
        let task = create(&app, &token, "Task").await;
        let uri = format!("/api/tasks/{}/status", task["id"].as_str().unwrap());

        let request = json_request("PATCH", &uri, Some(&token), serde_json::json!({"status": "Completed"}));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(updated["status"], "Completed");

        let request = json_request("PATCH", &uri, Some(&token), serde_json::json!({"status": "Blocked"}));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_twice_reports_not_found() {
        let app = test_app();
        let token = register(&app, "alice").await;
        let task = create(&app, &token, "Doomed").await;
        let uri = format!("/api/tasks/{}", task["id"].as_str().unwrap());

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(empty_request("DELETE", &uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_conflict_and_login() {
        let app = test_app();
        register(&app, "alice").await;

        let request = json_request(
            "POST",
            "/api/auth/register",
            None,
            serde_json::json!({"username": "alice", "email": "alice@example.com", "password": "x"}),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let request = json_request(
            "POST",
            "/api/auth/login",
            None,
            serde_json::json!({"email": "alice@example.com", "password": "wrong"}),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = json_request(
            "POST",
            "/api/auth/login",
            None,
            serde_json::json!({"email": "alice@example.com", "password": "hunter22"}),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["user"]["username"], "alice");
        assert!(!body["token"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let app = test_app();
        let token = register(&app, "alice").await;

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/api/auth/logout", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(empty_request("GET", "/api/auth/me", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
