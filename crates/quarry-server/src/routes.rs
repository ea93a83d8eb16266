//! REST routes over a shared [`ProjectManager`].

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use quarry_core::Project;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::manager::ProjectManager;
use crate::upload::FileForm;

/// Largest request body accepted, uploads included.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

type Shared = Arc<ProjectManager>;

/// Build the full application router.
pub fn router(manager: Shared) -> Router {
    let projects = Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/{id}", put(rename_project).delete(delete_project))
        .route("/{id}/file", put(replace_project_file))
        .route("/insight/{id}", post(project_insight))
        .route("/get_suggestion/{id}", get(project_suggestions));

    Router::new()
        .route("/", get(banner))
        .route("/healthz", get(healthz))
        .nest("/api/projects", projects)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(manager)
}

async fn banner() -> &'static str {
    "Quarry backend is running"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_projects(State(manager): State<Shared>) -> Result<Json<Vec<Project>>, ApiError> {
    manager
        .list()
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&e, "Error fetching projects"))
}

async fn create_project(
    State(manager): State<Shared>,
    req: Request,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let form = FileForm::extract(req, &(), manager.vault()).await?;
    let name = form.name.clone().unwrap_or_default();

    match manager.create(&name, form.source()).await {
        Ok(project) => Ok((StatusCode::CREATED, Json(project))),
        Err(e) => {
            form.discard(manager.vault()).await;
            Err(ApiError::from_error(&e, "Error creating project"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    #[serde(default)]
    name: String,
}

async fn rename_project(
    State(manager): State<Shared>,
    Path(id): Path<String>,
    body: Result<Json<RenameBody>, JsonRejection>,
) -> Result<Json<Project>, ApiError> {
    let Json(body) = body.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    manager
        .rename(&id, &body.name)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&e, "Error updating project"))
}

async fn delete_project(
    State(manager): State<Shared>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    manager
        .delete(&id)
        .await
        .map_err(|e| ApiError::from_error(&e, "Error deleting project"))?;
    Ok(Json(json!({ "message": "Project deleted successfully" })))
}

async fn replace_project_file(
    State(manager): State<Shared>,
    Path(id): Path<String>,
    req: Request,
) -> Result<Json<Project>, ApiError> {
    let form = FileForm::extract(req, &(), manager.vault()).await?;

    match manager.replace_file(&id, form.source()).await {
        Ok(project) => Ok(Json(project)),
        Err(e) => {
            form.discard(manager.vault()).await;
            Err(ApiError::from_error(&e, "Error updating project file"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct InsightBody {
    #[serde(default)]
    prompt: String,
}

async fn project_insight(
    State(manager): State<Shared>,
    Path(id): Path<String>,
    body: Result<Json<InsightBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    manager
        .insight(&id, &body.prompt)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&e, "Error generating insight"))
}

async fn project_suggestions(
    State(manager): State<Shared>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    manager
        .suggestions(&id)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&e, "Error fetching suggestions"))
}
