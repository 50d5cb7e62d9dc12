//! Supabase row store over the PostgREST API.

use super::{now_string, NewColumn, NewProject, NewTask, RowStore, StoreError, StoreResult};
use crate::board::{Column, ColumnId, Project, ProjectId, Task, TaskId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

const PROJECTS: &str = "projects";
const COLUMNS: &str = "project_columns";
const TASKS: &str = "project_tasks";

/// Project row as PostgREST returns it. `description` is nullable upstream.
#[derive(Debug, Deserialize)]
struct ProjectRow {
    id: ProjectId,
    title: String,
    description: Option<String>,
    status: Option<String>,
    created_at: String,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            title: row.title,
            description: row.description.unwrap_or_default(),
            status: row.status.unwrap_or_else(|| "active".to_string()),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskRow {
    id: TaskId,
    column_id: ColumnId,
    title: String,
    description: Option<String>,
    order_index: i64,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            column_id: row.column_id,
            title: row.title,
            description: row.description.unwrap_or_default(),
            order_index: row.order_index,
        }
    }
}

pub struct SupabaseRowStore {
    client: Client,
    url: String,
    service_role_key: String,
}

impl SupabaseRowStore {
    pub fn new(url: &str, service_role_key: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        }
    }

    /// Get the PostgREST URL.
    fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/{}", self.rest_url(), table)
        } else {
            format!("{}/{}?{}", self.rest_url(), table, query)
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> StoreResult<Vec<T>> {
        let resp = self
            .authed(self.client.get(self.table_url(table, query)))
            .send()
            .await?;
        let text = checked_text(resp).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn insert_one<T: DeserializeOwned>(
        &self,
        table: &str,
        body: serde_json::Value,
    ) -> StoreResult<T> {
        let resp = self
            .authed(self.client.post(self.table_url(table, "")))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let text = checked_text(resp).await?;
        let rows: Vec<T> = serde_json::from_str(&text)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidData(format!("no row returned from {}", table)))
    }
}

/// Read the body, mapping non-success statuses to `StoreError::Rejected`.
async fn checked_text(resp: Response) -> StoreResult<String> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}

/// PostgREST `in.(...)` filter value for a list of ids.
fn in_filter(ids: &[uuid::Uuid]) -> String {
    let joined: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("in.({})", joined.join(","))
}

/// Full task rows for the batch upsert. Every NOT NULL column must be present.
fn position_rows(tasks: &[Task]) -> serde_json::Value {
    serde_json::Value::Array(
        tasks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "column_id": t.column_id,
                    "title": t.title,
                    "description": t.description,
                    "order_index": t.order_index,
                })
            })
            .collect(),
    )
}

#[async_trait]
impl RowStore for SupabaseRowStore {
    fn is_persistent(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "supabase"
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let rows: Vec<ProjectRow> = self.select(PROJECTS, "order=created_at.desc").await?;
        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        let rows: Vec<ProjectRow> = self.select(PROJECTS, &format!("id=eq.{}", id)).await?;
        Ok(rows.into_iter().next().map(Project::from))
    }

    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        let body = serde_json::json!({
            "title": project.title,
            "description": project.description,
            "status": project.status,
            "created_at": now_string(),
        });
        let row: ProjectRow = self.insert_one(PROJECTS, body).await?;
        Ok(row.into())
    }

    async fn list_columns(&self, project_id: ProjectId) -> StoreResult<Vec<Column>> {
        self.select(
            COLUMNS,
            &format!("project_id=eq.{}&order=order_index.asc", project_id),
        )
        .await
    }

    async fn insert_column(&self, column: NewColumn) -> StoreResult<Column> {
        let body = serde_json::json!({
            "project_id": column.project_id,
            "title": column.title,
            "order_index": column.order_index,
        });
        self.insert_one(COLUMNS, body).await
    }

    async fn list_tasks(&self, column_ids: &[ColumnId]) -> StoreResult<Vec<Task>> {
        if column_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("column_id={}&order=order_index.asc", in_filter(column_ids));
        let rows: Vec<TaskRow> = self.select(TASKS, &query).await?;
        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
        let body = serde_json::json!({
            "column_id": task.column_id,
            "title": task.title,
            "description": task.description,
            "order_index": task.order_index,
        });
        let row: TaskRow = self.insert_one(TASKS, body).await?;
        Ok(row.into())
    }

    async fn update_task_column(&self, task_id: TaskId, column_id: ColumnId) -> StoreResult<()> {
        let resp = self
            .authed(
                self.client
                    .patch(self.table_url(TASKS, &format!("id=eq.{}", task_id))),
            )
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "column_id": column_id }))
            .send()
            .await?;
        let text = checked_text(resp).await?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&text)?;
        if rows.is_empty() {
            return Err(StoreError::NotFound {
                kind: "task",
                id: task_id,
            });
        }
        Ok(())
    }

    async fn write_task_positions(&self, tasks: &[Task]) -> StoreResult<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        // A bulk upsert runs as one statement, so PostgREST applies it atomically.
        let resp = self
            .authed(self.client.post(self.table_url(TASKS, "on_conflict=id")))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&position_rows(tasks))
            .send()
            .await?;
        checked_text(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let store = SupabaseRowStore::new("https://abc.supabase.co/", "key");
        assert_eq!(
            store.table_url(TASKS, "id=eq.1"),
            "https://abc.supabase.co/rest/v1/project_tasks?id=eq.1"
        );
        assert_eq!(
            store.table_url(PROJECTS, ""),
            "https://abc.supabase.co/rest/v1/projects"
        );
    }

    #[test]
    fn test_in_filter_lists_ids() {
        let a = Uuid::nil();
        let b = Uuid::new_v4();
        assert_eq!(
            in_filter(&[a, b]),
            format!("in.({},{})", a, b)
        );
    }

    #[test]
    fn test_position_rows_carry_full_task() {
        let task = Task {
            id: Uuid::new_v4(),
            column_id: Uuid::new_v4(),
            title: "Wireframes".to_string(),
            description: String::new(),
            order_index: 2,
        };
        let rows = position_rows(std::slice::from_ref(&task));
        assert_eq!(rows[0]["id"], serde_json::json!(task.id));
        assert_eq!(rows[0]["column_id"], serde_json::json!(task.column_id));
        assert_eq!(rows[0]["title"], "Wireframes");
        assert_eq!(rows[0]["order_index"], 2);
    }

    #[test]
    fn test_null_description_becomes_empty() {
        let row: TaskRow = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "column_id": Uuid::new_v4(),
            "title": "Copy",
            "description": null,
            "order_index": 0,
            "created_at": "2024-05-01T00:00:00+00:00"
        }))
        .unwrap();
        let task = Task::from(row);
        assert_eq!(task.description, "");
    }
}
