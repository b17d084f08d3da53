//! Storage layer abstraction and implementations.
//!
//! A document store persists `DocumentRecord`s keyed by their identifier and
//! hands the whole collection back, index-aligned, for ranking. Identifier
//! uniqueness is enforced by the store itself: inserting a known identifier is
//! a logged no-op, never an overwrite or an error.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Collection, DocumentRecord, EmbeddingConfig};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Schema or collection mismatch
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Other unexpected errors
    #[error("Unexpected storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of inserting a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertSummary {
    /// Identifiers that were newly persisted
    pub inserted: Vec<String>,

    /// Identifiers that already existed and were left untouched
    pub skipped: Vec<String>,
}

/// Trait for document storage backends.
///
/// Methods take `&self`: implementations serialize writes internally so a
/// single store can be shared between concurrent ingestion and query tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the collection this store serves.
    fn collection_name(&self) -> &str;

    /// Persist the embedding configuration.
    async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()>;

    /// Retrieve the embedding configuration, or `None` for a fresh store.
    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>>;

    /// Check whether a record with this identifier exists.
    async fn contains(&self, id: &str) -> StorageResult<bool>;

    /// Insert a batch of records.
    ///
    /// Records whose identifier is already present (in the store or earlier
    /// in the same batch) are skipped and reported in `InsertSummary::skipped`.
    async fn insert(&self, batch: &[DocumentRecord]) -> StorageResult<InsertSummary>;

    /// Return every stored record as an index-aligned collection, in
    /// insertion order.
    async fn fetch_all(&self) -> StorageResult<Collection>;

    /// Number of stored records.
    async fn count(&self) -> StorageResult<usize>;
}
