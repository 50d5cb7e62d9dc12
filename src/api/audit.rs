//! Website audit endpoint.
//!
//! `POST /api/audit {url}` returns the report, `{error}` otherwise. Every
//! failure after input validation collapses into one generic 500 message.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use super::routes::AppState;
use super::types::{api_error, ApiError};
use crate::audit::AuditReport;

pub const ANALYSIS_FAILED: &str = "Analysis failed. Make sure the URL is public and valid.";

/// Create audit routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(run_audit))
}

#[derive(Debug, Deserialize)]
pub struct AuditRequest {
    #[serde(default)]
    pub url: Option<String>,
}

async fn run_audit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuditRequest>,
) -> Result<Json<AuditReport>, ApiError> {
    let url = req
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "No URL provided"))?;

    let auditor = state.auditor.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Website audit is not configured",
        )
    })?;

    match auditor.audit(url).await {
        Ok(report) => {
            tracing::info!(url = %url, score = report.score, "Audit finished");
            Ok(Json(report))
        }
        Err(e) => {
            tracing::error!(url = %url, kind = e.kind(), "Audit failed: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, ANALYSIS_FAILED))
        }
    }
}
