//! Project API endpoints.
//!
//! - `GET /api/projects` - List projects, newest first
//! - `POST /api/projects` - Create a project with its default board columns
//! - `/api/projects/:id/board/...` - See [`super::board`]

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use super::routes::AppState;
use super::types::{api_error, ApiError};
use crate::board::Project;
use crate::projects::{self, ProjectError};

/// Create project routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .nest("/:id/board", super::board::routes())
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

async fn list_projects(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Project>>, ApiError> {
    state.store.list_projects().await.map(Json).map_err(|e| {
        tracing::warn!("Failed to list projects: {}", e);
        api_error(StatusCode::BAD_GATEWAY, e.to_string())
    })
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    match projects::create_project(state.store.as_ref(), &req.title, req.description.as_deref())
        .await
    {
        Ok((project, _columns)) => Ok((StatusCode::CREATED, Json(project))),
        Err(ProjectError::EmptyTitle) => Err(api_error(
            StatusCode::BAD_REQUEST,
            ProjectError::EmptyTitle.to_string(),
        )),
        Err(ProjectError::Store(e)) => {
            tracing::warn!("Failed to create project: {}", e);
            Err(api_error(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}
