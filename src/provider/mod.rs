//! Paper source module.
//!
//! This module defines the interface for fetching paper metadata by PubMed ID
//! and includes the NCBI E-utilities implementation.
//!
//! The `PaperSource` trait abstracts the source of paper data, so the
//! ingestion pipeline can be exercised against fixtures without network access.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

pub mod pubmed;

/// Fields of a fetched paper, keyed by field name (`pmid`, `title`,
/// `abstract`, `journal`, ...). Values are already flattened to strings.
pub type PaperFields = BTreeMap<String, String>;

/// Errors that can occur when fetching papers from a source.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The source answered with a non-success status
    #[error("Unexpected response status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Failed to parse the response format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// No article exists for the requested identifier
    #[error("Paper not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for fetching paper metadata by identifier.
///
/// # Design Notes
///
/// - Sources return fields without embeddings; embedding is the pipeline's job
/// - Sources do not deduplicate; the store enforces identifier uniqueness
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Fetch the fields of one paper.
    ///
    /// # Errors
    /// Returns `ProviderError::NotFound` if no article exists for `pmid`, or
    /// another variant if the request or parsing fails
    async fn fetch(&self, pmid: &str) -> ProviderResult<PaperFields>;

    /// Human-readable name of this source, for logging.
    fn name(&self) -> &str;
}
