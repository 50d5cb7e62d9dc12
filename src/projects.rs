//! Project provisioning.
//!
//! New projects start with a fixed set of board columns. Columns are not
//! created, renamed or removed anywhere else.

use thiserror::Error;

use crate::board::{normalize_title, Column, Project};
use crate::store::{NewColumn, NewProject, RowStore, StoreError};

/// Columns every new project board starts with, left to right.
pub const DEFAULT_COLUMNS: [&str; 3] = ["To Do", "In Progress", "Done"];

pub const DEFAULT_DESCRIPTION: &str = "New Project";
pub const DEFAULT_STATUS: &str = "active";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project title must not be empty")]
    EmptyTitle,

    #[error("Row store error: {0}")]
    Store(#[from] StoreError),
}

/// Insert a project and its default columns.
///
/// Columns are inserted one after another. If one fails the project row stays,
/// with whatever columns were created before the failure.
pub async fn create_project(
    store: &dyn RowStore,
    title: &str,
    description: Option<&str>,
) -> Result<(Project, Vec<Column>), ProjectError> {
    let title = normalize_title(title).ok_or(ProjectError::EmptyTitle)?;
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DESCRIPTION)
        .to_string();

    let project = store
        .insert_project(NewProject {
            title,
            description,
            status: DEFAULT_STATUS.to_string(),
        })
        .await?;

    let mut columns = Vec::with_capacity(DEFAULT_COLUMNS.len());
    for (i, name) in DEFAULT_COLUMNS.iter().enumerate() {
        let column = store
            .insert_column(NewColumn {
                project_id: project.id,
                title: name.to_string(),
                order_index: i as i64,
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    project_id = %project.id,
                    column = %name,
                    "Project created without all default columns: {}",
                    e
                );
                e
            })?;
        columns.push(column);
    }

    tracing::info!(project_id = %project.id, title = %project.title, "Created project");
    Ok((project, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardReconciler, MovePersistence};
    use crate::store::InMemoryRowStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_project_provisions_default_columns() {
        let store = Arc::new(InMemoryRowStore::new());
        let (project, columns) = create_project(store.as_ref(), "  Brand refresh ", None)
            .await
            .unwrap();
        assert_eq!(project.title, "Brand refresh");
        assert_eq!(project.description, "New Project");
        assert_eq!(project.status, "active");

        let titles: Vec<&str> = columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, DEFAULT_COLUMNS.to_vec());
        let indexes: Vec<i64> = columns.iter().map(|c| c.order_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);

        let reconciler = BoardReconciler::new(store.clone(), MovePersistence::default());
        let board = reconciler.load(project.id).await.unwrap();
        assert_eq!(board.col_order, columns.iter().map(|c| c.id).collect::<Vec<_>>());
        assert_eq!(board.task_count(), 0);
    }

    #[tokio::test]
    async fn test_create_project_keeps_description() {
        let store = InMemoryRowStore::new();
        let (project, _) = create_project(&store, "Retainer", Some(" Monthly SEO work "))
            .await
            .unwrap();
        assert_eq!(project.description, "Monthly SEO work");
    }

    #[tokio::test]
    async fn test_blank_title_rejected_before_insert() {
        let store = InMemoryRowStore::new();
        let result = create_project(&store, "   ", None).await;
        assert!(matches!(result, Err(ProjectError::EmptyTitle)));
        assert!(store.list_projects().await.unwrap().is_empty());
    }
}
