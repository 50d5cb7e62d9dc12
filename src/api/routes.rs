//! HTTP route definitions and server setup.

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth::{self, MagicLinks};
use super::board::BoardViews;
use super::types::HealthResponse;
use super::{audit as audit_api, projects as projects_api};
use crate::audit::Auditor;
use crate::board::BoardReconciler;
use crate::config::Config;
use crate::store::{create_row_store, RowStore};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Row store backing projects, columns and tasks
    pub store: Arc<dyn RowStore>,
    pub reconciler: BoardReconciler,
    /// Board views loaded by each user
    pub boards: BoardViews,
    /// Outstanding sign-in links
    pub magic_links: MagicLinks,
    /// Website auditor (absent without an API key)
    pub auditor: Option<Auditor>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RowStore>, auditor: Option<Auditor>) -> Self {
        let reconciler = BoardReconciler::new(Arc::clone(&store), config.move_persistence);
        let boards = BoardViews::new(config.board_view_idle);
        Self {
            config,
            store,
            reconciler,
            boards,
            magic_links: MagicLinks::new(),
            auditor,
        }
    }
}

/// Build the full router for `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/magic-link", post(auth::request_magic_link))
        .route("/api/auth/verify", post(auth::verify));

    let protected_routes = Router::new()
        .route("/api/auth/session", get(auth::session))
        .nest("/api/projects", projects_api::routes())
        .nest("/api/audit", audit_api::routes())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = create_row_store(&config.store).await?;
    tracing::info!(
        backend = store.backend_name(),
        persistent = store.is_persistent(),
        "Row store ready"
    );

    let auditor = Auditor::from_config(&config.audit);
    if auditor.is_none() {
        tracing::warn!("GOOGLE_API_KEY not set; website audit endpoint is disabled");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, store, auditor));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    // Background position writes still in flight are dropped with the runtime.
    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dev_mode: state.config.dev_mode,
        auth_required: !state.config.dev_mode,
        store: state.store.backend_name().to_string(),
        persistent: state.store.is_persistent(),
        move_persistence: state.reconciler.move_persistence().as_str().to_string(),
        audit_enabled: state.auditor.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::audit::ANALYSIS_FAILED;
    use crate::board::{Board, Column, ColumnId, Project, ProjectId, Task, TaskId};
    use crate::llm::{LlmClient, LlmError};
    use crate::store::{InMemoryRowStore, NewColumn, NewProject, NewTask, StoreResult};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn test_state(dev_mode: bool) -> Arc<AppState> {
        let mut config = Config::new("test-secret");
        config.dev_mode = dev_mode;
        Arc::new(AppState::new(
            config,
            Arc::new(InMemoryRowStore::new()),
            None,
        ))
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn column_id(board: &Board, title: &str) -> String {
        board
            .ordered_columns()
            .find(|c| c.column.title == title)
            .map(|c| c.column.id.to_string())
            .expect("column should exist")
    }

    fn titles(board: &Board, title: &str) -> Vec<String> {
        board
            .ordered_columns()
            .find(|c| c.column.title == title)
            .map(|c| c.tasks.iter().map(|t| t.title.clone()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = build_router(test_state(false));
        let (status, body) = call(&app, "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["auth_required"], true);
        assert_eq!(body["audit_enabled"], false);
        assert_eq!(body["move_persistence"], "resequence");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = build_router(test_state(false));
        let (status, _) = call(&app, "GET", "/api/projects", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "GET", "/api/projects", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_magic_link_sign_in() {
        let state = test_state(false);
        let app = build_router(Arc::clone(&state));

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/magic-link",
            None,
            Some(json!({ "email": "Ops@Agency.io" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.get("link").is_none(), "link is only returned in dev mode");

        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/magic-link",
            None,
            Some(json!({ "email": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // The emailed token never reaches the response, so mint one directly.
        let token = state
            .magic_links
            .issue("ops@agency.io", std::time::Duration::from_secs(60))
            .await;
        let (status, session) = call(
            &app,
            "POST",
            "/api/auth/verify",
            None,
            Some(json!({ "token": token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["email"], "ops@agency.io");
        let jwt = session["token"].as_str().unwrap().to_string();

        let (status, me) = call(&app, "GET", "/api/auth/session", Some(&jwt), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "ops@agency.io");

        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/verify",
            None,
            Some(json!({ "token": token })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "links are single use");
    }

    #[tokio::test]
    async fn test_dev_mode_returns_link() {
        let app = build_router(test_state(true));
        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/magic-link",
            None,
            Some(json!({ "email": "ops@agency.io" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let link = body["link"].as_str().unwrap();
        assert!(link.starts_with("http://localhost:3000/login?token="));
    }

    #[tokio::test]
    async fn test_project_board_flow() {
        let app = build_router(test_state(true));

        let (status, _) = call(
            &app,
            "POST",
            "/api/projects",
            None,
            Some(json!({ "title": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, project) = call(
            &app,
            "POST",
            "/api/projects",
            None,
            Some(json!({ "title": "Website Redesign" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(project["description"], "New Project");
        let board_uri = format!("/api/projects/{}/board", project["id"].as_str().unwrap());

        // Mutations need a loaded view.
        let (status, _) = call(
            &app,
            "POST",
            &format!("{}/tasks", board_uri),
            None,
            Some(json!({ "column_id": uuid::Uuid::new_v4(), "title": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, "GET", &board_uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        let board: Board = serde_json::from_value(body).unwrap();
        let todo = column_id(&board, "To Do");
        let done = column_id(&board, "Done");

        for title in ["T1", "T2", "T3"] {
            let (status, task) = call(
                &app,
                "POST",
                &format!("{}/tasks", board_uri),
                None,
                Some(json!({ "column_id": todo, "title": title })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            let task: Task = serde_json::from_value(task).unwrap();
            assert_eq!(task.title, title);
        }

        let (status, body) = call(
            &app,
            "POST",
            &format!("{}/tasks", board_uri),
            None,
            Some(json!({ "column_id": done, "title": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, body) = call(
            &app,
            "POST",
            &format!("{}/reorder", board_uri),
            None,
            Some(json!({ "column_id": todo, "from_index": 0, "to_index": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let board: Board = serde_json::from_value(body).unwrap();
        assert_eq!(titles(&board, "To Do"), vec!["T2", "T3", "T1"]);

        let t2 = board.column(board.col_order[0]).unwrap().tasks[0].id;
        let (status, body) = call(
            &app,
            "POST",
            &format!("{}/drop", board_uri),
            None,
            Some(json!({
                "task_id": t2,
                "source": { "column_id": todo, "index": 0 },
                "destination": { "column_id": done, "index": 0 }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let board: Board = serde_json::from_value(body).unwrap();
        assert_eq!(titles(&board, "To Do"), vec!["T3", "T1"]);
        assert_eq!(titles(&board, "Done"), vec!["T2"]);

        let (status, body) = call(
            &app,
            "POST",
            &format!("{}/move", board_uri),
            None,
            Some(json!({
                "task_id": t2,
                "source_column_id": todo,
                "source_index": 0,
                "dest_column_id": done,
                "dest_index": 0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "T2 is no longer in To Do: {}", body);
    }

    /// Memory store whose task inserts wait until the test lets them through.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryRowStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RowStore for GatedStore {
        fn is_persistent(&self) -> bool {
            false
        }

        fn backend_name(&self) -> &'static str {
            "gated"
        }

        async fn list_projects(&self) -> StoreResult<Vec<Project>> {
            self.inner.list_projects().await
        }

        async fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
            self.inner.get_project(id).await
        }

        async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
            self.inner.insert_project(project).await
        }

        async fn list_columns(&self, project_id: ProjectId) -> StoreResult<Vec<Column>> {
            self.inner.list_columns(project_id).await
        }

        async fn insert_column(&self, column: NewColumn) -> StoreResult<Column> {
            self.inner.insert_column(column).await
        }

        async fn list_tasks(&self, column_ids: &[ColumnId]) -> StoreResult<Vec<Task>> {
            self.inner.list_tasks(column_ids).await
        }

        async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.insert_task(task).await
        }

        async fn update_task_column(&self, task_id: TaskId, column_id: ColumnId) -> StoreResult<()> {
            self.inner.update_task_column(task_id, column_id).await
        }

        async fn write_task_positions(&self, tasks: &[Task]) -> StoreResult<()> {
            self.inner.write_task_positions(tasks).await
        }
    }

    async fn create_and_load(app: &Router, title: &str) -> (String, Board) {
        let (_, project) = call(
            app,
            "POST",
            "/api/projects",
            None,
            Some(json!({ "title": title })),
        )
        .await;
        let uri = format!("/api/projects/{}/board", project["id"].as_str().unwrap());
        let (status, body) = call(app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        (uri, serde_json::from_value(body).unwrap())
    }

    #[tokio::test]
    async fn test_slow_insert_does_not_block_other_boards() {
        let store = Arc::new(GatedStore::default());
        let mut config = Config::new("test-secret");
        config.dev_mode = true;
        let app = build_router(Arc::new(AppState::new(config, store.clone(), None)));

        let (uri_a, board_a) = create_and_load(&app, "Project A").await;
        let (uri_b, board_b) = create_and_load(&app, "Project B").await;

        let pending = tokio::spawn({
            let app = app.clone();
            let body = json!({ "column_id": column_id(&board_a, "To Do"), "title": "Slow" });
            async move { call(&app, "POST", &format!("{}/tasks", uri_a), None, Some(body)).await }
        });
        store.entered.notified().await;

        // Project A's insert is still parked in the store.
        let (status, _) = tokio::time::timeout(
            Duration::from_secs(1),
            call(&app, "GET", &uri_b, None, None),
        )
        .await
        .expect("board B should load while A is inserting");
        assert_eq!(status, StatusCode::OK);

        let todo_b = column_id(&board_b, "To Do");
        let (status, _) = tokio::time::timeout(
            Duration::from_secs(1),
            call(
                &app,
                "POST",
                &format!("{}/reorder", uri_b),
                None,
                Some(json!({ "column_id": todo_b, "from_index": 0, "to_index": 0 })),
            ),
        )
        .await
        .expect("board B should accept edits while A is inserting");
        assert_eq!(status, StatusCode::BAD_REQUEST, "To Do on B is empty");

        store.release.notify_one();
        let (status, task) = pending.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["title"], "Slow");
    }

    #[tokio::test]
    async fn test_released_board_needs_reload() {
        let app = build_router(test_state(true));
        let (uri, board) = create_and_load(&app, "Retainer").await;
        let todo = column_id(&board, "To Do");

        let (status, _) = call(&app, "DELETE", &uri, None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let body = json!({ "column_id": todo, "title": "Kickoff" });
        let (status, _) = call(&app, "POST", &format!("{}/tasks", uri), None, Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        call(&app, "GET", &uri, None, None).await;
        let body = json!({ "column_id": todo, "title": "Kickoff" });
        let (status, _) = call(&app, "POST", &format!("{}/tasks", uri), None, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_unknown_project_board_is_404() {
        let app = build_router(test_state(true));
        let uri = format!("/api/projects/{}/board", uuid::Uuid::new_v4());
        let (status, _) = call(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_projects_listed_newest_first() {
        let app = build_router(test_state(true));
        for title in ["First", "Second"] {
            let body = Some(json!({ "title": title }));
            call(&app, "POST", "/api/projects", None, body).await;
        }
        let (status, body) = call(&app, "GET", "/api/projects", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["title"], "Second");
        assert_eq!(body[1]["title"], "First");
    }

    struct UnusedLlm;

    #[async_trait]
    impl LlmClient for UnusedLlm {
        async fn generate_text(&self, _model: &str, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::parse_error("not expected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_audit_errors() {
        let app = build_router(test_state(true));
        let (status, body) = call(&app, "POST", "/api/audit", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No URL provided");

        let (status, _) = call(
            &app,
            "POST",
            "/api/audit",
            None,
            Some(json!({ "url": "example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let mut config = Config::new("test-secret");
        config.dev_mode = true;
        let auditor = Auditor::new(&config.audit, Arc::new(UnusedLlm));
        let state = Arc::new(AppState::new(
            config,
            Arc::new(InMemoryRowStore::new()),
            Some(auditor),
        ));
        let app = build_router(state);
        let (status, body) = call(
            &app,
            "POST",
            "/api/audit",
            None,
            Some(json!({ "url": "https://" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], ANALYSIS_FAILED);
    }
}
