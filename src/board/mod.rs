//! Kanban boards.
//!
//! - [`model`]: rows, the in-memory [`Board`] and its pure edit operations
//! - [`reconciler`]: loads boards and writes edits back to the row store

mod model;
mod reconciler;

pub use model::{
    normalize_title, Board, BoardColumn, BoardError, Column, ColumnId, DragDrop, DropLocation,
    DropOutcome, Project, ProjectId, Task, TaskId, TaskMove,
};
pub use reconciler::{BoardReconciler, MovePersistence, PersistHandle, ReconcileError};
