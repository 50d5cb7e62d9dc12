//! Website audit: scrape a public page and have an LLM score it.
//!
//! The flow is fetch, strip markup, prompt, then parse the answer against a
//! fixed report shape. Nothing is retried or cached.

mod prompt;
mod scrape;

pub use prompt::{build_prompt, parse_report, strip_code_fences, FINDINGS_PER_REPORT};
pub use scrape::{extract_page, normalize_url, PageSnapshot};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::AuditConfig;
use crate::llm::{GeminiClient, LlmClient, LlmError};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Invalid URL: {0:?}")]
    InvalidUrl(String),

    #[error("Failed to fetch page: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model answer is not valid JSON: {0}")]
    MalformedResponse(String),

    #[error("Model answer does not match the report shape: {0}")]
    SchemaViolation(String),
}

impl AuditError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::Fetch(_) => "fetch",
            Self::Llm(_) => "llm",
            Self::MalformedResponse(_) => "malformed_response",
            Self::SchemaViolation(_) => "schema_violation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Success,
    Warning,
    Error,
}

impl FindingStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "success" => Some(Self::Success),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: String,
    pub status: FindingStatus,
    pub title: String,
    pub detail: String,
}

/// Validated audit result, returned to the client as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub score: u8,
    pub findings: Vec<Finding>,
}

pub struct Auditor {
    http: reqwest::Client,
    llm: Arc<dyn LlmClient>,
    model: String,
    max_chars: usize,
}

impl Auditor {
    pub fn new(config: &AuditConfig, llm: Arc<dyn LlmClient>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; AgencyWorkspaceAudit/1.0)")
            .timeout(config.fetch_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            llm,
            model: config.model.clone(),
            max_chars: config.max_chars,
        }
    }

    /// Build an auditor backed by Gemini, or `None` when no API key is configured.
    pub fn from_config(config: &AuditConfig) -> Option<Self> {
        if !config.is_enabled() {
            return None;
        }
        let key = config.google_api_key.as_deref()?.trim().to_string();
        Some(Self::new(config, Arc::new(GeminiClient::new(key))))
    }

    /// Audit the page at `raw_url` (scheme optional).
    pub async fn audit(&self, raw_url: &str) -> Result<AuditReport, AuditError> {
        let url = normalize_url(raw_url)?;
        let html = scrape::fetch_html(&self.http, &url).await?;
        let page = extract_page(&html, raw_url, self.max_chars);
        tracing::debug!(
            url = %url,
            title = %page.title,
            chars = page.text.len(),
            "Fetched page for audit"
        );
        self.analyze(&page).await
    }

    /// Prompt the model with an already extracted page.
    pub async fn analyze(&self, page: &PageSnapshot) -> Result<AuditReport, AuditError> {
        let answer = self.llm.generate_text(&self.model, &build_prompt(page)).await?;
        parse_report(&answer)
    }
}
