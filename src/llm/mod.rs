//! LLM client module.
//!
//! A small trait over text-completion providers, with Google's Gemini API as
//! the implementation used by the website audit.

mod error;
mod gemini;

pub use error::{classify_http_status, LlmError, LlmErrorKind};
pub use gemini::GeminiClient;

use async_trait::async_trait;

/// Trait for LLM text completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single user prompt and return the model's text answer.
    async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, LlmError>;
}
