//! Board reconciler: applies edits to an owned [`Board`] and propagates them
//! to the row store.
//!
//! Reads (`load`) and inserts (`add_task`) are awaited. Position writes after a
//! reorder or move are spawned and never awaited by the caller; a failed write
//! is logged and the local board is left as the user arranged it. Writes for
//! one project run one after another in the order they were issued.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::model::{
    normalize_title, Board, BoardError, ColumnId, DragDrop, DropOutcome, ProjectId, Task, TaskId,
    TaskMove,
};
use crate::store::{NewTask, RowStore, StoreError, StoreResult};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Board(#[from] BoardError),

    #[error("Project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("Row store error: {0}")]
    Store(#[from] StoreError),
}

/// How a cross-column move is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovePersistence {
    /// Write `column_id` and `order_index` of every task in both columns.
    #[default]
    Resequence,
    /// Write only the moved task's `column_id`. Its stored `order_index` keeps
    /// the old position until the column is reordered.
    ColumnOnly,
}

impl MovePersistence {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "resequence" | "batch" => Some(Self::Resequence),
            "column_only" | "column" => Some(Self::ColumnOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resequence => "resequence",
            Self::ColumnOnly => "column_only",
        }
    }
}

/// A background write issued after a local edit.
///
/// Dropping the handle detaches the write. Tests await [`PersistHandle::settled`].
#[derive(Debug)]
pub struct PersistHandle {
    result: oneshot::Receiver<StoreResult<()>>,
}

impl PersistHandle {
    /// Wait for the write to finish.
    pub async fn settled(self) -> StoreResult<()> {
        self.result
            .await
            .unwrap_or_else(|_| Err(StoreError::Task("position write was aborted".to_string())))
    }
}

pub struct BoardReconciler {
    store: Arc<dyn RowStore>,
    move_persistence: MovePersistence,
    /// Most recent write per project. A new write starts after it finishes, so
    /// storage sees edits in the order they were made.
    write_tails: Mutex<HashMap<ProjectId, JoinHandle<()>>>,
}

impl BoardReconciler {
    pub fn new(store: Arc<dyn RowStore>, move_persistence: MovePersistence) -> Self {
        Self {
            store,
            move_persistence,
            write_tails: Mutex::new(HashMap::new()),
        }
    }

    pub fn move_persistence(&self) -> MovePersistence {
        self.move_persistence
    }

    /// Fetch a project's board from scratch. Nothing is cached between calls.
    pub async fn load(&self, project_id: ProjectId) -> Result<Board, ReconcileError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or(ReconcileError::ProjectNotFound(project_id))?;
        let columns = self.store.list_columns(project_id).await?;
        let column_ids: Vec<ColumnId> = columns.iter().map(|c| c.id).collect();
        let tasks = self.store.list_tasks(&column_ids).await?;

        let board = Board::assemble(project, columns, tasks);
        tracing::debug!(
            project_id = %project_id,
            columns = board.col_order.len(),
            tasks = board.task_count(),
            "Loaded board"
        );
        Ok(board)
    }

    /// Reorder within one column and persist the new positions in the background.
    ///
    /// Returns `None` when `from == to`; nothing is written then.
    pub fn reorder_within_column(
        &self,
        board: &mut Board,
        column_id: ColumnId,
        from: usize,
        to: usize,
    ) -> Result<Option<PersistHandle>, ReconcileError> {
        let positions = board.reorder_within_column(column_id, from, to)?;
        Ok(self.persist_positions(board.project.id, column_id, positions))
    }

    /// Move a task to another column and persist it in the background.
    pub fn move_across_columns(
        &self,
        board: &mut Board,
        task_id: TaskId,
        source: ColumnId,
        source_index: usize,
        dest: ColumnId,
        dest_index: usize,
    ) -> Result<PersistHandle, ReconcileError> {
        let moved = board.move_across_columns(task_id, source, source_index, dest, dest_index)?;
        Ok(self.persist_move(board.project.id, moved))
    }

    /// Apply a finished drag gesture.
    pub fn apply_drop(
        &self,
        board: &mut Board,
        drop: &DragDrop,
    ) -> Result<Option<PersistHandle>, ReconcileError> {
        match board.apply_drop(drop)? {
            DropOutcome::Unchanged => Ok(None),
            DropOutcome::Reordered {
                column_id,
                positions,
            } => Ok(self.persist_positions(board.project.id, column_id, positions)),
            DropOutcome::Moved(moved) => Ok(Some(self.persist_move(board.project.id, moved))),
        }
    }

    /// Insert a task at the end of `column_id`.
    ///
    /// A blank title is ignored without touching storage. The board only
    /// changes once the insert succeeded.
    pub async fn add_task(
        &self,
        board: &mut Board,
        column_id: ColumnId,
        title: &str,
    ) -> Result<Option<Task>, ReconcileError> {
        let Some(title) = normalize_title(title) else {
            return Ok(None);
        };
        let order_index = board.next_order_index(column_id)?;

        let task = self
            .store
            .insert_task(NewTask {
                column_id,
                title,
                description: String::new(),
                order_index,
            })
            .await?;
        board.append_task(task.clone())?;
        tracing::debug!(task_id = %task.id, column_id = %column_id, "Added task");
        Ok(Some(task))
    }

    fn persist_positions(
        &self,
        project_id: ProjectId,
        column_id: ColumnId,
        positions: Vec<Task>,
    ) -> Option<PersistHandle> {
        if positions.is_empty() {
            return None;
        }
        let store = self.store.clone();
        Some(self.spawn_write(project_id, "Column reorder", column_id, async move {
            store.write_task_positions(&positions).await
        }))
    }

    fn persist_move(&self, project_id: ProjectId, moved: TaskMove) -> PersistHandle {
        let store = self.store.clone();
        let dest = moved.task.column_id;
        match self.move_persistence {
            MovePersistence::ColumnOnly => {
                let task_id = moved.task.id;
                self.spawn_write(project_id, "Task move", dest, async move {
                    store.update_task_column(task_id, dest).await
                })
            }
            MovePersistence::Resequence => {
                let mut rows = moved.source_tasks;
                rows.extend(moved.dest_tasks);
                self.spawn_write(project_id, "Task move", dest, async move {
                    store.write_task_positions(&rows).await
                })
            }
        }
    }

    /// Queue `write` behind the project's previous write and run it in the background.
    fn spawn_write<F>(
        &self,
        project_id: ProjectId,
        what: &'static str,
        column_id: ColumnId,
        write: F,
    ) -> PersistHandle
    where
        F: Future<Output = StoreResult<()>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut tails = self.write_tails.lock().unwrap_or_else(PoisonError::into_inner);
        tails.retain(|_, tail| !tail.is_finished());
        let previous = tails.remove(&project_id);

        let tail = tokio::spawn(async move {
            if let Some(previous) = previous {
                // Only ordering matters here; the previous write reported its own result.
                let _ = previous.await;
            }
            let result = write.await;
            match &result {
                Ok(()) => tracing::debug!(column_id = %column_id, "{} persisted", what),
                Err(e) => tracing::warn!(
                    project_id = %project_id,
                    column_id = %column_id,
                    error = %e,
                    "{} failed to persist; board view and storage may differ until reload",
                    what
                ),
            }
            let _ = tx.send(result);
        });
        tails.insert(project_id, tail);
        PersistHandle { result: rx }
    }
}
