//! Board API endpoints, nested under `/api/projects/:id/board`.
//!
//! `GET` loads the board and becomes the caller's working view. Mutations edit
//! that view and return it; position writes happen in the background. `DELETE`
//! discards the view, and views left idle are dropped after a while.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::auth::AuthUser;
use super::routes::AppState;
use super::types::{api_error, ApiError, ErrorResponse};
use crate::board::{Board, BoardError, ColumnId, DragDrop, ProjectId, ReconcileError, TaskId};

/// Create board routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_board).delete(release_board))
        .route("/drop", post(drop_task))
        .route("/reorder", post(reorder_tasks))
        .route("/move", post(move_task))
        .route("/tasks", post(add_task))
}

pub type ViewKey = (String, ProjectId);

struct View {
    board: Arc<Mutex<Board>>,
    last_used: Instant,
}

/// Loaded boards, one per signed-in user and project.
///
/// The map lock is only held for lookups. Each board has its own lock, so a
/// slow insert on one board never holds up another.
pub struct BoardViews {
    views: Mutex<HashMap<ViewKey, View>>,
    idle_ttl: Duration,
}

impl BoardViews {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            views: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Make `board` the caller's view, replacing any earlier one.
    pub async fn open(&self, key: ViewKey, board: Board) -> Arc<Mutex<Board>> {
        let now = Instant::now();
        let board = Arc::new(Mutex::new(board));
        let mut views = self.views.lock().await;
        self.prune(&mut views, now);
        views.insert(
            key,
            View {
                board: Arc::clone(&board),
                last_used: now,
            },
        );
        board
    }

    /// The caller's view, if loaded and not idle for too long.
    pub async fn get(&self, key: &ViewKey) -> Option<Arc<Mutex<Board>>> {
        let now = Instant::now();
        let mut views = self.views.lock().await;
        self.prune(&mut views, now);
        let view = views.get_mut(key)?;
        view.last_used = now;
        Some(Arc::clone(&view.board))
    }

    /// Drop the caller's view. Returns whether one was loaded.
    pub async fn release(&self, key: &ViewKey) -> bool {
        self.views.lock().await.remove(key).is_some()
    }

    pub async fn loaded_count(&self) -> usize {
        self.views.lock().await.len()
    }

    fn prune(&self, views: &mut HashMap<ViewKey, View>, now: Instant) {
        let before = views.len();
        views.retain(|_, view| now.duration_since(view.last_used) < self.idle_ttl);
        let dropped = before - views.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Dropped idle board views");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub column_id: ColumnId,
    pub from_index: usize,
    pub to_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub task_id: TaskId,
    pub source_column_id: ColumnId,
    pub source_index: usize,
    pub dest_column_id: ColumnId,
    pub dest_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct AddTaskRequest {
    pub column_id: ColumnId,
    pub title: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn reconcile_error(error: ReconcileError) -> ApiError {
    let status = match &error {
        ReconcileError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
        ReconcileError::Board(BoardError::ColumnNotFound(_)) => StatusCode::NOT_FOUND,
        ReconcileError::Board(_) => StatusCode::BAD_REQUEST,
        ReconcileError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    api_error(status, error.to_string())
}

async fn loaded_view(
    state: &AppState,
    user: AuthUser,
    project_id: ProjectId,
) -> Result<Arc<Mutex<Board>>, ApiError> {
    state
        .boards
        .get(&(user.email, project_id))
        .await
        .ok_or_else(not_loaded)
}

fn not_loaded() -> ApiError {
    api_error(
        StatusCode::CONFLICT,
        "Board is not loaded; GET the board first",
    )
}

/// Load a project's board and make it the caller's working view.
async fn get_board(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<Board>, ApiError> {
    let board = state.reconciler.load(project_id).await.map_err(|e| {
        tracing::warn!(project_id = %project_id, "Failed to load board: {}", e);
        reconcile_error(e)
    })?;

    state
        .boards
        .open((user.email, project_id), board.clone())
        .await;
    Ok(Json(board))
}

/// Discard the caller's view, e.g. when they leave the board page.
async fn release_board(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
) -> StatusCode {
    if state.boards.release(&(user.email, project_id)).await {
        tracing::debug!(project_id = %project_id, "Released board view");
    }
    StatusCode::NO_CONTENT
}

/// Apply a drag gesture as the board UI reports it on drop.
async fn drop_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
    Json(req): Json<DragDrop>,
) -> Result<Json<Board>, ApiError> {
    let view = loaded_view(&state, user, project_id).await?;
    let mut board = view.lock().await;
    state
        .reconciler
        .apply_drop(&mut board, &req)
        .map_err(reconcile_error)?;
    Ok(Json(board.clone()))
}

async fn reorder_tasks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Board>, ApiError> {
    let view = loaded_view(&state, user, project_id).await?;
    let mut board = view.lock().await;
    state
        .reconciler
        .reorder_within_column(&mut board, req.column_id, req.from_index, req.to_index)
        .map_err(reconcile_error)?;
    Ok(Json(board.clone()))
}

async fn move_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<Board>, ApiError> {
    let view = loaded_view(&state, user, project_id).await?;
    let mut board = view.lock().await;
    state
        .reconciler
        .move_across_columns(
            &mut board,
            req.task_id,
            req.source_column_id,
            req.source_index,
            req.dest_column_id,
            req.dest_index,
        )
        .map_err(reconcile_error)?;
    Ok(Json(board.clone()))
}

/// Add a task to the end of a column.
///
/// 201 with the stored task, 204 for a blank title. A failed insert answers
/// 502 and echoes the submitted title.
async fn add_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
    Json(req): Json<AddTaskRequest>,
) -> Result<Response, ApiError> {
    let view = loaded_view(&state, user, project_id).await?;
    let mut board = view.lock().await;

    match state.reconciler.add_task(&mut board, req.column_id, &req.title).await {
        Ok(Some(task)) => Ok((StatusCode::CREATED, Json(task)).into_response()),
        Ok(None) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(ReconcileError::Store(e)) => {
            tracing::warn!(column_id = %req.column_id, "Failed to add task: {}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("Failed to save task: {}", e),
                    title: Some(req.title),
                }),
            ))
        }
        Err(e) => Err(reconcile_error(e)),
    }
}
