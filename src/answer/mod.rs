//! Answer generation module.
//!
//! An answer provider turns a question plus a retrieved context into
//! generated text. The Vertex AI Gemini implementation lives in [`vertex`].

pub mod vertex;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during answer generation.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// The generation API could not be reached
    #[error("API request failed: {0}")]
    ApiError(String),

    /// The API answered with a non-success status
    #[error("Unexpected response status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The response did not contain any generated text
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// No access token could be obtained for the request
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Invalid configuration or missing credentials
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for answer operations.
pub type AnswerResult<T> = Result<T, AnswerError>;

/// Trait for generative models that answer from a supplied context.
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    /// Generate an answer to `question` grounded in `context`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the model returns no text.
    /// No retry is attempted.
    async fn generate_answer(&self, question: &str, context: &str) -> AnswerResult<String>;

    /// Name of the underlying model, for logging.
    fn model_name(&self) -> &str;
}

/// Build the prompt sent to the generative model.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Please answer the following question based on the context. Question: {}, Context: {}.",
        question, context
    )
}
