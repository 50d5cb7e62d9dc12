//! SQLite-based row store.

use super::{now_string, NewColumn, NewProject, NewTask, RowStore, StoreError, StoreResult};
use crate::board::{Column, ColumnId, Project, ProjectId, Task, TaskId};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_created_at ON projects(created_at DESC);

CREATE TABLE IF NOT EXISTS project_columns (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    title TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_columns_project ON project_columns(project_id, order_index);

CREATE TABLE IF NOT EXISTS project_tasks (
    id TEXT PRIMARY KEY NOT NULL,
    column_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    order_index INTEGER NOT NULL,
    FOREIGN KEY (column_id) REFERENCES project_columns(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tasks_column ON project_tasks(column_id, order_index);
"#;

pub struct SqliteRowStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRowStore {
    /// Open (or create) the database file and apply the schema.
    pub async fn open(db_path: PathBuf) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            tracing::info!("Opened SQLite row store at {}", db_path.display());
            Ok::<_, StoreError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, handy for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await?
    }
}

fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{}` in {}", value, column)))
}

fn project_from_row(row: &Row<'_>) -> StoreResult<Project> {
    let id: String = row.get("id")?;
    Ok(Project {
        id: parse_uuid(&id, "projects.id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
    })
}

fn column_from_row(row: &Row<'_>) -> StoreResult<Column> {
    let id: String = row.get("id")?;
    let project_id: String = row.get("project_id")?;
    Ok(Column {
        id: parse_uuid(&id, "project_columns.id")?,
        project_id: parse_uuid(&project_id, "project_columns.project_id")?,
        title: row.get("title")?,
        order_index: row.get("order_index")?,
    })
}

fn task_from_row(row: &Row<'_>) -> StoreResult<Task> {
    let id: String = row.get("id")?;
    let column_id: String = row.get("column_id")?;
    Ok(Task {
        id: parse_uuid(&id, "project_tasks.id")?,
        column_id: parse_uuid(&column_id, "project_tasks.column_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        order_index: row.get("order_index")?,
    })
}

fn ensure_exists(
    conn: &Connection,
    table: &'static str,
    kind: &'static str,
    id: Uuid,
) -> StoreResult<()> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", table),
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound { kind, id }),
    }
}

#[async_trait]
impl RowStore for SqliteRowStore {
    fn is_persistent(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, status, created_at
                 FROM projects
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut projects = Vec::new();
            while let Some(row) = rows.next()? {
                projects.push(project_from_row(row)?);
            }
            Ok(projects)
        })
        .await
    }

    async fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, status, created_at
                 FROM projects
                 WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.to_string()])?;
            match rows.next()? {
                Some(row) => Ok(Some(project_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        self.with_conn(move |conn| {
            let project = Project {
                id: Uuid::new_v4(),
                title: project.title,
                description: project.description,
                status: project.status,
                created_at: now_string(),
            };
            conn.execute(
                "INSERT INTO projects (id, title, description, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    project.id.to_string(),
                    project.title,
                    project.description,
                    project.status,
                    project.created_at,
                ],
            )?;
            Ok(project)
        })
        .await
    }

    async fn list_columns(&self, project_id: ProjectId) -> StoreResult<Vec<Column>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, title, order_index
                 FROM project_columns
                 WHERE project_id = ?1
                 ORDER BY order_index ASC, rowid ASC",
            )?;
            let mut rows = stmt.query([project_id.to_string()])?;
            let mut columns = Vec::new();
            while let Some(row) = rows.next()? {
                columns.push(column_from_row(row)?);
            }
            Ok(columns)
        })
        .await
    }

    async fn insert_column(&self, column: NewColumn) -> StoreResult<Column> {
        self.with_conn(move |conn| {
            ensure_exists(conn, "projects", "project", column.project_id)?;
            let column = Column {
                id: Uuid::new_v4(),
                project_id: column.project_id,
                title: column.title,
                order_index: column.order_index,
            };
            conn.execute(
                "INSERT INTO project_columns (id, project_id, title, order_index)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    column.id.to_string(),
                    column.project_id.to_string(),
                    column.title,
                    column.order_index,
                ],
            )?;
            Ok(column)
        })
        .await
    }

    async fn list_tasks(&self, column_ids: &[ColumnId]) -> StoreResult<Vec<Task>> {
        if column_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = column_ids.iter().map(|id| id.to_string()).collect();
        self.with_conn(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "SELECT id, column_id, title, description, order_index
                 FROM project_tasks
                 WHERE column_id IN ({})
                 ORDER BY order_index ASC, rowid ASC",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(ids.iter()))?;
            let mut tasks = Vec::new();
            while let Some(row) = rows.next()? {
                tasks.push(task_from_row(row)?);
            }
            Ok(tasks)
        })
        .await
    }

    async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
        self.with_conn(move |conn| {
            ensure_exists(conn, "project_columns", "column", task.column_id)?;
            let task = Task {
                id: Uuid::new_v4(),
                column_id: task.column_id,
                title: task.title,
                description: task.description,
                order_index: task.order_index,
            };
            conn.execute(
                "INSERT INTO project_tasks (id, column_id, title, description, order_index)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    task.id.to_string(),
                    task.column_id.to_string(),
                    task.title,
                    task.description,
                    task.order_index,
                ],
            )?;
            Ok(task)
        })
        .await
    }

    async fn update_task_column(&self, task_id: TaskId, column_id: ColumnId) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE project_tasks SET column_id = ?2 WHERE id = ?1",
                params![task_id.to_string(), column_id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound {
                    kind: "task",
                    id: task_id,
                });
            }
            Ok(())
        })
        .await
    }

    async fn write_task_positions(&self, tasks: &[Task]) -> StoreResult<()> {
        let updates: Vec<(String, String, i64)> = tasks
            .iter()
            .map(|t| (t.id.to_string(), t.column_id.to_string(), t.order_index))
            .collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for (id, column_id, order_index) in &updates {
                let changed = tx.execute(
                    "UPDATE project_tasks SET column_id = ?2, order_index = ?3 WHERE id = ?1",
                    params![id, column_id, order_index],
                )?;
                if changed == 0 {
                    // Dropping the transaction rolls back earlier rows.
                    return Err(StoreError::NotFound {
                        kind: "task",
                        id: parse_uuid(id, "project_tasks.id")?,
                    });
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(store: &SqliteRowStore) -> (Project, Column, Column) {
        let project = store
            .insert_project(NewProject {
                title: "Brand refresh".to_string(),
                description: "New Project".to_string(),
                status: "active".to_string(),
            })
            .await
            .expect("Failed to insert project");
        let mut columns = Vec::new();
        for (i, title) in ["To Do", "Done"].iter().enumerate() {
            columns.push(
                store
                    .insert_column(NewColumn {
                        project_id: project.id,
                        title: title.to_string(),
                        order_index: i as i64,
                    })
                    .await
                    .expect("Failed to insert column"),
            );
        }
        let done = columns.pop().unwrap();
        let todo = columns.pop().unwrap();
        (project, todo, done)
    }

    fn new_task(column_id: ColumnId, title: &str, order_index: i64) -> NewTask {
        NewTask {
            column_id,
            title: title.to_string(),
            description: String::new(),
            order_index,
        }
    }

    #[tokio::test]
    async fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("workspace.db");

        let project_id = {
            let store = SqliteRowStore::open(path.clone()).await.expect("open");
            let (project, todo, _) = seeded(&store).await;
            store.insert_task(new_task(todo.id, "Kickoff", 0)).await.unwrap();
            project.id
        };

        let store = SqliteRowStore::open(path).await.expect("reopen");
        let project = store.get_project(project_id).await.unwrap().expect("project");
        assert_eq!(project.title, "Brand refresh");
        let columns = store.list_columns(project_id).await.unwrap();
        let titles: Vec<&str> = columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["To Do", "Done"]);
        let ids: Vec<ColumnId> = columns.iter().map(|c| c.id).collect();
        assert_eq!(store.list_tasks(&ids).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_tasks_filters_and_orders() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        let (_, todo, done) = seeded(&store).await;
        store.insert_task(new_task(todo.id, "second", 1)).await.unwrap();
        store.insert_task(new_task(todo.id, "first", 0)).await.unwrap();
        store.insert_task(new_task(done.id, "shipped", 0)).await.unwrap();

        let tasks = store.list_tasks(&[todo.id]).await.unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(store.list_tasks(&[todo.id, done.id]).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_write_task_positions_rolls_back_on_missing_row() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        let (_, todo, done) = seeded(&store).await;
        let a = store.insert_task(new_task(todo.id, "a", 0)).await.unwrap();

        let mut moved = a.clone();
        moved.column_id = done.id;
        moved.order_index = 4;
        let mut ghost = a.clone();
        ghost.id = Uuid::new_v4();

        let result = store.write_task_positions(&[moved.clone(), ghost]).await;
        assert!(matches!(result, Err(StoreError::NotFound { kind: "task", .. })));
        let still = store.list_tasks(&[todo.id]).await.unwrap();
        assert_eq!(still, vec![a]);

        store.write_task_positions(&[moved.clone()]).await.unwrap();
        assert_eq!(store.list_tasks(&[done.id]).await.unwrap(), vec![moved]);
    }

    #[tokio::test]
    async fn test_update_task_column_missing_task() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        let (_, todo, _) = seeded(&store).await;
        let result = store.update_task_column(Uuid::new_v4(), todo.id).await;
        assert!(matches!(result, Err(StoreError::NotFound { kind: "task", .. })));
    }

    #[tokio::test]
    async fn test_insert_column_requires_project() {
        let store = SqliteRowStore::open_in_memory().unwrap();
        let result = store
            .insert_column(NewColumn {
                project_id: Uuid::new_v4(),
                title: "Orphan".to_string(),
                order_index: 0,
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { kind: "project", .. })));
    }
}
