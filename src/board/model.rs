//! Board rows and the in-memory board aggregate.
//!
//! Every mutation here is pure: it edits an owned [`Board`] and hands back the
//! rows that need persisting. Issuing those writes is the reconciler's job.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type ColumnId = Uuid;
pub type TaskId = Uuid;

/// A client project; root aggregate of one board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
    pub created_at: String,
}

/// A column of a project board ("To Do", "Done", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub project_id: ProjectId,
    pub title: String,
    pub order_index: i64,
}

/// A card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub column_id: ColumnId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Position within the owning column, dense from zero.
    pub order_index: i64,
}

/// A column together with its ordered tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardColumn {
    #[serde(flatten)]
    pub column: Column,
    pub tasks: Vec<Task>,
}

/// In-memory view of one project's board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub project: Project,
    pub columns: HashMap<ColumnId, BoardColumn>,
    /// Left-to-right render order of `columns`.
    pub col_order: Vec<ColumnId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("Column {0} is not on this board")]
    ColumnNotFound(ColumnId),

    #[error("Index {index} is out of range for column {column_id} ({len} tasks)")]
    IndexOutOfRange {
        column_id: ColumnId,
        index: usize,
        len: usize,
    },

    #[error("Task {task_id} is not at position {index} of column {column_id}")]
    TaskMismatch {
        task_id: TaskId,
        column_id: ColumnId,
        index: usize,
    },

    #[error("Source and destination are the same column {0}")]
    SameColumn(ColumnId),
}

/// One end of a drag gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropLocation {
    pub column_id: ColumnId,
    pub index: usize,
}

/// Result of a finished drag gesture. `destination` is `None` when the card was
/// dropped outside any column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragDrop {
    pub task_id: TaskId,
    pub source: DropLocation,
    #[serde(default)]
    pub destination: Option<DropLocation>,
}

/// Snapshot of a cross-column move, taken after the board was updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMove {
    pub task: Task,
    pub source_column_id: ColumnId,
    /// Source column tasks with their re-derived positions.
    pub source_tasks: Vec<Task>,
    /// Destination column tasks with their re-derived positions.
    pub dest_tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    Unchanged,
    Reordered {
        column_id: ColumnId,
        positions: Vec<Task>,
    },
    Moved(TaskMove),
}

impl Board {
    /// Build a board from freshly fetched rows.
    ///
    /// Columns keep the order they were fetched in. Tasks are grouped under their
    /// column in `order_index` order; tasks pointing at unknown columns are dropped.
    pub fn assemble(project: Project, columns: Vec<Column>, tasks: Vec<Task>) -> Self {
        let col_order: Vec<ColumnId> = columns.iter().map(|c| c.id).collect();
        let mut map: HashMap<ColumnId, BoardColumn> = columns
            .into_iter()
            .map(|column| {
                (
                    column.id,
                    BoardColumn {
                        column,
                        tasks: Vec::new(),
                    },
                )
            })
            .collect();

        for task in tasks {
            if let Some(col) = map.get_mut(&task.column_id) {
                col.tasks.push(task);
            }
        }
        for col in map.values_mut() {
            col.tasks.sort_by_key(|t| t.order_index);
        }

        Self {
            project,
            columns: map,
            col_order,
        }
    }

    pub fn column(&self, column_id: ColumnId) -> Option<&BoardColumn> {
        self.columns.get(&column_id)
    }

    /// Columns in render order.
    pub fn ordered_columns(&self) -> impl Iterator<Item = &BoardColumn> {
        self.col_order.iter().filter_map(|id| self.columns.get(id))
    }

    /// Total number of tasks across all columns.
    pub fn task_count(&self) -> usize {
        self.columns.values().map(|c| c.tasks.len()).sum()
    }

    fn column_mut(&mut self, column_id: ColumnId) -> Result<&mut BoardColumn, BoardError> {
        self.columns
            .get_mut(&column_id)
            .ok_or(BoardError::ColumnNotFound(column_id))
    }

    /// Move the task at `from` to `to` within one column.
    ///
    /// Returns the column's tasks with their new positions, or an empty list when
    /// `from == to` and nothing changed.
    pub fn reorder_within_column(
        &mut self,
        column_id: ColumnId,
        from: usize,
        to: usize,
    ) -> Result<Vec<Task>, BoardError> {
        let col = self.column_mut(column_id)?;
        let len = col.tasks.len();
        for index in [from, to] {
            if index >= len {
                return Err(BoardError::IndexOutOfRange {
                    column_id,
                    index,
                    len,
                });
            }
        }
        if from == to {
            return Ok(Vec::new());
        }

        let task = col.tasks.remove(from);
        col.tasks.insert(to, task);
        resequence(&mut col.tasks);
        Ok(col.tasks.clone())
    }

    /// Move `task_id` from `source` column to `dest` column at `dest_index`.
    ///
    /// `dest_index` may equal the destination length (append).
    pub fn move_across_columns(
        &mut self,
        task_id: TaskId,
        source: ColumnId,
        source_index: usize,
        dest: ColumnId,
        dest_index: usize,
    ) -> Result<TaskMove, BoardError> {
        if source == dest {
            return Err(BoardError::SameColumn(source));
        }

        // Validate both ends before touching either column.
        let src = self
            .columns
            .get(&source)
            .ok_or(BoardError::ColumnNotFound(source))?;
        let dst = self
            .columns
            .get(&dest)
            .ok_or(BoardError::ColumnNotFound(dest))?;
        match src.tasks.get(source_index) {
            None => {
                return Err(BoardError::IndexOutOfRange {
                    column_id: source,
                    index: source_index,
                    len: src.tasks.len(),
                })
            }
            Some(task) if task.id != task_id => {
                return Err(BoardError::TaskMismatch {
                    task_id,
                    column_id: source,
                    index: source_index,
                })
            }
            Some(_) => {}
        }
        if dest_index > dst.tasks.len() {
            return Err(BoardError::IndexOutOfRange {
                column_id: dest,
                index: dest_index,
                len: dst.tasks.len(),
            });
        }

        let src = self.column_mut(source)?;
        let mut task = src.tasks.remove(source_index);
        resequence(&mut src.tasks);
        let source_tasks = src.tasks.clone();

        task.column_id = dest;
        let dst = self.column_mut(dest)?;
        dst.tasks.insert(dest_index, task);
        resequence(&mut dst.tasks);
        let dest_tasks = dst.tasks.clone();

        Ok(TaskMove {
            task: dest_tasks[dest_index].clone(),
            source_column_id: source,
            source_tasks,
            dest_tasks,
        })
    }

    /// Apply a finished drag gesture the way the board UI reports it.
    pub fn apply_drop(&mut self, drop: &DragDrop) -> Result<DropOutcome, BoardError> {
        let Some(destination) = drop.destination else {
            return Ok(DropOutcome::Unchanged);
        };
        let source = drop.source;
        if source.column_id == destination.column_id {
            if source.index == destination.index {
                return Ok(DropOutcome::Unchanged);
            }
            let positions =
                self.reorder_within_column(source.column_id, source.index, destination.index)?;
            return Ok(DropOutcome::Reordered {
                column_id: source.column_id,
                positions,
            });
        }

        self.move_across_columns(
            drop.task_id,
            source.column_id,
            source.index,
            destination.column_id,
            destination.index,
        )
        .map(DropOutcome::Moved)
    }

    /// Position a new task appended to `column_id` would get.
    pub fn next_order_index(&self, column_id: ColumnId) -> Result<i64, BoardError> {
        self.columns
            .get(&column_id)
            .map(|c| c.tasks.len() as i64)
            .ok_or(BoardError::ColumnNotFound(column_id))
    }

    /// Append an already persisted task to the end of its column.
    pub fn append_task(&mut self, task: Task) -> Result<(), BoardError> {
        self.column_mut(task.column_id)?.tasks.push(task);
        Ok(())
    }
}

/// Trim a task title; `None` when nothing is left.
pub fn normalize_title(title: &str) -> Option<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resequence(tasks: &mut [Task]) {
    for (index, task) in tasks.iter_mut().enumerate() {
        task.order_index = index as i64;
    }
}
