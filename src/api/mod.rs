//! HTTP API for the agency workspace.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `POST /api/auth/magic-link` - Request a sign-in link
//! - `POST /api/auth/verify` - Exchange a sign-in token for a session
//! - `GET /api/auth/session` - Current user
//! - `GET /api/projects` - List projects
//! - `POST /api/projects` - Create a project with default columns
//! - `GET /api/projects/:id/board` - Load a project board
//! - `DELETE /api/projects/:id/board` - Discard the loaded board
//! - `POST /api/projects/:id/board/drop` - Apply a drag gesture
//! - `POST /api/projects/:id/board/reorder` - Reorder within a column
//! - `POST /api/projects/:id/board/move` - Move a task to another column
//! - `POST /api/projects/:id/board/tasks` - Add a task
//! - `POST /api/audit` - Audit a website

mod audit;
mod auth;
mod board;
mod projects;
mod routes;
pub mod types;

pub use auth::AuthUser;
pub use routes::{build_router, serve, AppState};
pub use types::*;
