//! Row storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing and demos)
//! - `sqlite`: Local SQLite database
//! - `supabase`: Hosted Postgres through the Supabase PostgREST API

mod memory;
mod sqlite;
mod supabase;

pub use memory::InMemoryRowStore;
pub use sqlite::SqliteRowStore;
pub use supabase::SupabaseRowStore;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::board::{Column, ColumnId, Project, ProjectId, Task, TaskId};
use crate::config::StoreConfig;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Row store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid row data: {0}")]
    InvalidData(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Task(value.to_string())
    }
}

/// Fields for a project insert.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub status: String,
}

/// Fields for a column insert.
#[derive(Debug, Clone)]
pub struct NewColumn {
    pub project_id: ProjectId,
    pub title: String,
    pub order_index: i64,
}

/// Fields for a task insert.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub column_id: ColumnId,
    pub title: String,
    pub description: String,
    pub order_index: i64,
}

/// Get current timestamp as RFC3339 string with fixed precision, so string
/// order matches time order.
pub fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Row store trait - implemented by all storage backends.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Short backend name for health output and logs.
    fn backend_name(&self) -> &'static str;

    /// List projects, newest first.
    async fn list_projects(&self) -> StoreResult<Vec<Project>>;

    /// Get a single project by ID.
    async fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>>;

    /// Insert a project row.
    async fn insert_project(&self, project: NewProject) -> StoreResult<Project>;

    /// List a project's columns ordered by `order_index` ascending.
    async fn list_columns(&self, project_id: ProjectId) -> StoreResult<Vec<Column>>;

    /// Insert a column row.
    async fn insert_column(&self, column: NewColumn) -> StoreResult<Column>;

    /// List the tasks of the given columns ordered by `order_index` ascending.
    async fn list_tasks(&self, column_ids: &[ColumnId]) -> StoreResult<Vec<Task>>;

    /// Insert a task row and return it with its generated ID.
    async fn insert_task(&self, task: NewTask) -> StoreResult<Task>;

    /// Point a task at another column. Its `order_index` is left untouched.
    async fn update_task_column(&self, task_id: TaskId, column_id: ColumnId) -> StoreResult<()>;

    /// Persist `column_id` and `order_index` of every given task in one atomic write.
    ///
    /// Either all rows are written or none are.
    async fn write_task_positions(&self, tasks: &[Task]) -> StoreResult<()>;
}

/// Row store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowStoreType {
    Memory,
    #[default]
    Sqlite,
    Supabase,
}

impl RowStoreType {
    /// Parse from environment variable value.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "memory" => Self::Memory,
            "sqlite" | "db" => Self::Sqlite,
            "supabase" | "postgrest" => Self::Supabase,
            _ => Self::default(),
        }
    }
}

/// Create a row store based on configuration.
pub async fn create_row_store(config: &StoreConfig) -> StoreResult<Arc<dyn RowStore>> {
    match config.backend {
        RowStoreType::Memory => Ok(Arc::new(InMemoryRowStore::new())),
        RowStoreType::Sqlite => {
            let store = SqliteRowStore::open(config.sqlite_path.clone()).await?;
            Ok(Arc::new(store))
        }
        RowStoreType::Supabase => {
            let url = config.supabase_url.as_deref().unwrap_or_default();
            let key = config.supabase_service_role_key.as_deref().unwrap_or_default();
            if url.is_empty() || key.is_empty() {
                return Err(StoreError::InvalidData(
                    "supabase store requires SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY"
                        .to_string(),
                ));
            }
            Ok(Arc::new(SupabaseRowStore::new(url, key)))
        }
    }
}
