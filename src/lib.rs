//! # Agency Workspace
//!
//! Backend for an agency workspace: kanban project boards and AI website audits.
//!
//! This library provides:
//! - A board reconciler that applies drag/drop and add-task edits to an
//!   in-memory board and writes them back to a row store
//! - Row stores over memory, SQLite and Supabase (PostgREST)
//! - An HTTP API with magic-link sign-in
//! - A website audit that scrapes a page and has Gemini score it
//!
//! ## Board Flow
//!
//! ```text
//!   GET board ──► BoardReconciler::load ──► Board (per user view)
//!                                              │
//!   drop / reorder / move ──► pure Board edit ─┤──► background batch write
//!   add task ──────────────► awaited insert ───┘
//! ```
//!
//! ## Modules
//! - `board`: board model and reconciler
//! - `store`: row store trait and backends
//! - `projects`: project creation with default columns
//! - `audit`: website audit pipeline
//! - `llm`: Gemini client
//! - `api`: HTTP routes
//! - `config`: environment configuration

pub mod api;
pub mod audit;
pub mod board;
pub mod config;
pub mod llm;
pub mod projects;
pub mod store;

pub use config::Config;
