//! In-memory row store (non-persistent).

use super::{now_string, NewColumn, NewProject, NewTask, RowStore, StoreError, StoreResult};
use crate::board::{Column, ColumnId, Project, ProjectId, Task, TaskId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    projects: Vec<Project>,
    columns: Vec<Column>,
    tasks: Vec<Task>,
}

#[derive(Clone, Default)]
pub struct InMemoryRowStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    fn is_persistent(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let mut projects = self.tables.read().await.projects.clone();
        // Newest first; insertion order breaks timestamp ties.
        projects.reverse();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        let tables = self.tables.read().await;
        Ok(tables.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        let project = Project {
            id: Uuid::new_v4(),
            title: project.title,
            description: project.description,
            status: project.status,
            created_at: now_string(),
        };
        self.tables.write().await.projects.push(project.clone());
        Ok(project)
    }

    async fn list_columns(&self, project_id: ProjectId) -> StoreResult<Vec<Column>> {
        let tables = self.tables.read().await;
        let mut columns: Vec<Column> = tables
            .columns
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        columns.sort_by_key(|c| c.order_index);
        Ok(columns)
    }

    async fn insert_column(&self, column: NewColumn) -> StoreResult<Column> {
        let mut tables = self.tables.write().await;
        if !tables.projects.iter().any(|p| p.id == column.project_id) {
            return Err(StoreError::NotFound {
                kind: "project",
                id: column.project_id,
            });
        }
        let column = Column {
            id: Uuid::new_v4(),
            project_id: column.project_id,
            title: column.title,
            order_index: column.order_index,
        };
        tables.columns.push(column.clone());
        Ok(column)
    }

    async fn list_tasks(&self, column_ids: &[ColumnId]) -> StoreResult<Vec<Task>> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .iter()
            .filter(|t| column_ids.contains(&t.column_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.order_index);
        Ok(tasks)
    }

    async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
        let mut tables = self.tables.write().await;
        if !tables.columns.iter().any(|c| c.id == task.column_id) {
            return Err(StoreError::NotFound {
                kind: "column",
                id: task.column_id,
            });
        }
        let task = Task {
            id: Uuid::new_v4(),
            column_id: task.column_id,
            title: task.title,
            description: task.description,
            order_index: task.order_index,
        };
        tables.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task_column(&self, task_id: TaskId, column_id: ColumnId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(StoreError::NotFound {
                kind: "task",
                id: task_id,
            })?;
        task.column_id = column_id;
        Ok(())
    }

    async fn write_task_positions(&self, tasks: &[Task]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        // Resolve every row first so a missing one leaves the table untouched.
        let mut slots = Vec::with_capacity(tasks.len());
        for task in tasks {
            let slot = tables
                .tasks
                .iter()
                .position(|t| t.id == task.id)
                .ok_or(StoreError::NotFound {
                    kind: "task",
                    id: task.id,
                })?;
            slots.push(slot);
        }
        for (slot, task) in slots.into_iter().zip(tasks) {
            let row = &mut tables.tasks[slot];
            row.column_id = task.column_id;
            row.order_index = task.order_index;
        }
        Ok(())
    }
}
