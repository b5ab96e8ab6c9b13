//! JSON HTTP API over [`ProjectService`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/api/create-project-async` | Create a project from `{name, description?, filenames[]}` |
//! | `GET`    | `/api/get-project-info/{id}` | Project with documents and answers |
//! | `GET`    | `/api/list-projects` | All projects |
//! | `GET`    | `/api/list-available-files` | Filenames in the data directory |
//! | `DELETE` | `/api/delete-project/{id}` | Delete a project and everything it owns |
//! | `POST`   | `/api/generate-all-answers/{id}` | Start an extraction run with a JSON array of questions |
//! | `POST`   | `/api/define-fields/{id}` | Acknowledge `[{name, description}]` field definitions |
//!
//! `generate-all-answers` returns as soon as the run is started; poll
//! `get-project-info` until the project status is `completed`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "project not found: 1234" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Request bodies that are not valid JSON of the expected shape, or that
//! lack a JSON content type, are `bad_request`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser frontend
//! on another port can call the API.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use tabular_review_core::models::{NewProject, Project};

use crate::projects::{FieldDefinition, ProjectService};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    service: Arc<ProjectService>,
}

/// Build the router. Split from [`run_server`] so it can be served on
/// any listener.
pub fn router(service: Arc<ProjectService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/create-project-async", post(handle_create_project))
        .route("/api/get-project-info/{id}", get(handle_get_project))
        .route("/api/list-projects", get(handle_list_projects))
        .route("/api/list-available-files", get(handle_list_files))
        .route("/api/delete-project/{id}", delete(handle_delete_project))
        .route("/api/generate-all-answers/{id}", post(handle_generate))
        .route("/api/define-fields/{id}", post(handle_define_fields))
        .layer(cors)
        .with_state(AppState { service })
}

/// Bind to `bind_addr` and serve until the process is terminated.
pub async fn run_server(service: Arc<ProjectService>, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Body extraction failures use the same error body as every other 400.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

fn project_not_found(id: &str) -> AppError {
    not_found(format!("project not found: {}", id))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Projects ============

async fn handle_create_project(
    State(state): State<AppState>,
    payload: Result<Json<NewProject>, JsonRejection>,
) -> Result<Json<Project>, AppError> {
    let Json(new) = payload?;
    if new.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    let project = state.service.create_project(&new).await.map_err(internal)?;
    Ok(Json(project))
}

async fn handle_get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, AppError> {
    state
        .service
        .get_project(&id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| project_not_found(&id))
}

async fn handle_list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, AppError> {
    let projects = state.service.list_projects().await.map_err(internal)?;
    Ok(Json(projects))
}

async fn handle_list_files(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.service.list_available_files())
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    project_id: String,
}

async fn handle_delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    if !state.service.delete_project(&id).await.map_err(internal)? {
        return Err(project_not_found(&id));
    }
    Ok(Json(StatusResponse {
        status: "deleted",
        project_id: id,
    }))
}

// ============ Extraction ============

async fn handle_generate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Json(questions) = payload?;
    if questions.is_empty() {
        return Err(bad_request("at least one question is required"));
    }

    // the run outlives the request; its handle is dropped here
    state
        .service
        .spawn_generation(&id, questions)
        .await
        .map_err(internal)?
        .ok_or_else(|| project_not_found(&id))?;

    Ok(Json(StatusResponse {
        status: "processing_started",
        project_id: id,
    }))
}

#[derive(Serialize)]
struct FieldsResponse {
    status: &'static str,
    count: usize,
}

async fn handle_define_fields(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Vec<FieldDefinition>>, JsonRejection>,
) -> Result<Json<FieldsResponse>, AppError> {
    let Json(fields) = payload?;
    Ok(Json(FieldsResponse {
        status: "fields_defined",
        count: state.service.define_fields(&id, &fields),
    }))
}
