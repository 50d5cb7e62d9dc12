//! API request and response types.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// JSON error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,

    /// Task title the client submitted, echoed back when an add-task write fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            title: None,
        }),
    )
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Whether the server is running in dev mode (auth disabled)
    pub dev_mode: bool,

    /// Whether API requests need a session token
    pub auth_required: bool,

    /// Row store backend ("memory", "sqlite", "supabase")
    pub store: String,

    /// Whether the row store survives restarts
    pub persistent: bool,

    /// How cross-column moves are persisted ("resequence", "column_only")
    pub move_persistence: String,

    /// Whether `POST /api/audit` is available
    pub audit_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicLinkResponse {
    pub sent: bool,

    /// Sign-in link, only returned in dev mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    /// Expiry as unix seconds
    pub exp: i64,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    pub email: String,
}
