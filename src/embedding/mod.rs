//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for text embedding generation. Abstracts
//! are embedded during ingestion and questions are embedded at query time; both
//! sides must go through a provider reporting the same model and dimension.

pub mod fastembed;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Invalid input text (e.g., empty)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., unknown model name)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Model inference failed
    #[error("Inference failed: {0}")]
    InferenceError(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors turn text into fixed-length vectors. The trait is async so
/// that API-backed providers fit behind the same seam as local models.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Number of dimensions in the produced vectors.
    fn dimension(&self) -> usize;

    /// Model identifier (e.g., "all-MiniLM-L6-v2").
    fn model_name(&self) -> &str;

    /// The configuration this provider would persist into a store.
    fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: self.model_name().to_string(),
            dimension: self.dimension(),
        }
    }
}

/// Normalizes text for consistent embedding generation.
///
/// This function applies the following transformations:
/// - Converts to lowercase
/// - Trims leading/trailing whitespace
/// - Collapses runs of whitespace (including newlines) to a single space
///
/// # Example
/// ```
/// use pubmed_rag::embedding::normalize_text;
/// assert_eq!(normalize_text("  Tumor\n  Suppressor  "), "tumor suppressor");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
