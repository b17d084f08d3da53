//! Ingestion pipeline module.
//!
//! Turns PubMed locators into stored documents:
//! extract the PMID, fetch the paper, embed its abstract, stamp the creation
//! date, split primary fields from metadata and hand the batch to the store.
//!
//! # Usage
//!
//! ```ignore
//! use pubmed_rag::ingestion::IngestionPipeline;
//!
//! let pipeline = IngestionPipeline::connect(embedder, store, source).await?;
//! let stats = pipeline
//!     .ingest(&["https://pubmed.ncbi.nlm.nih.gov/15858239/".to_string()])
//!     .await?;
//! println!("Inserted: {}, Duplicates: {}", stats.inserted, stats.duplicates_skipped);
//! ```
//!
//! Failures of a single locator (bad URL, fetch error, missing abstract,
//! embedding error) are logged and counted; they never abort the batch. Only
//! a failing store is fatal.

use std::sync::{Arc, LazyLock};

use chrono::{Local, NaiveDate};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{DocumentRecord, Metadata};
use crate::provider::{PaperFields, PaperSource};
use crate::query::ranking::l2_norm;
use crate::storage::DocumentStore;

static PMID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"pubmed\.ncbi\.nlm\.nih\.gov/(\d+)/?").ok());

/// Metadata key holding the ingestion date.
pub const CREATED_KEY: &str = "created";

const DEFAULT_ID_KEY: &str = "pmid";

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// No PubMed identifier could be extracted from the locator
    #[error("Could not extract a PubMed ID from '{0}'")]
    Extraction(String),

    /// Fetching the paper failed
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Invalid input data or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Extract the PubMed identifier from a PubMed article URL.
///
/// # Errors
/// `IngestionError::Extraction` for empty input or a locator that does not
/// contain `pubmed.ncbi.nlm.nih.gov/<digits>`.
pub fn extract_pubmed_id(locator: &str) -> IngestionResult<String> {
    PMID_PATTERN
        .as_ref()
        .and_then(|re| re.captures(locator))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| IngestionError::Extraction(locator.to_string()))
}

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    /// Total number of locators processed
    pub total_processed: usize,

    /// Number of documents newly inserted
    pub inserted: usize,

    /// Number of documents skipped because their identifier already existed
    pub duplicates_skipped: usize,

    /// Number of locators that failed before reaching the store
    pub failed: usize,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inserted(&mut self) {
        self.total_processed += 1;
        self.inserted += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.total_processed += 1;
        self.duplicates_skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }

    /// Add the counts of another run to this one.
    pub fn merge(&mut self, other: &IngestionStats) {
        self.total_processed += other.total_processed;
        self.inserted += other.inserted;
        self.duplicates_skipped += other.duplicates_skipped;
        self.failed += other.failed;
    }
}

/// Which fetched fields become a record's primary fields.
///
/// The embedding is always primary. Every field other than `id_key` and
/// `text_key` ends up in the record's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    pub id_key: String,
    pub text_key: String,
}

impl Default for RecordShape {
    fn default() -> Self {
        Self {
            id_key: DEFAULT_ID_KEY.to_string(),
            text_key: "abstract".to_string(),
        }
    }
}

impl RecordShape {
    /// Build a stored record from fetched fields.
    ///
    /// `created` is stamped into the metadata as `YYYY-MM-DD`.
    ///
    /// # Errors
    /// `IngestionError::InvalidInput` if the id or text field is missing or
    /// blank.
    pub fn structure(
        &self,
        mut fields: PaperFields,
        embedding: Vec<f32>,
        url: &str,
        created: NaiveDate,
    ) -> IngestionResult<DocumentRecord> {
        let id = take_required(&mut fields, &self.id_key)?;
        let text = take_required(&mut fields, &self.text_key)?;

        let mut metadata: Metadata = fields.into_iter().collect();
        metadata.insert(CREATED_KEY.to_string(), created.format("%Y-%m-%d").to_string());

        Ok(DocumentRecord {
            id,
            text,
            embedding,
            url: url.to_string(),
            metadata,
        })
    }
}

fn take_required(fields: &mut PaperFields, key: &str) -> IngestionResult<String> {
    match fields.remove(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(IngestionError::InvalidInput(format!(
            "missing required field '{}'",
            key
        ))),
    }
}

/// Ingestion pipeline coordinator.
///
/// Holds shared handles so the same store can serve the query engine while
/// ingestion runs.
pub struct IngestionPipeline<E: ?Sized, S: ?Sized, P: ?Sized> {
    embedding_provider: Arc<E>,
    store: Arc<S>,
    source: Arc<P>,
    shape: RecordShape,
}

impl<E, S, P> IngestionPipeline<E, S, P>
where
    E: EmbeddingProvider + ?Sized,
    S: DocumentStore + ?Sized,
    P: PaperSource + ?Sized,
{
    /// Connect to a store and prepare for ingestion.
    ///
    /// A store without an embedding configuration adopts the provider's. A
    /// store that already has one must match the provider exactly.
    ///
    /// # Errors
    /// `IngestionError::InvalidInput` on a model or dimension mismatch,
    /// `IngestionError::StorageError` if the configuration cannot be read or
    /// written.
    pub async fn connect(embedding_provider: Arc<E>, store: Arc<S>, source: Arc<P>) -> IngestionResult<Self> {
        let provider_config = embedding_provider.config();
        let stored_config = store
            .get_config()
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        match stored_config {
            None => {
                info!(
                    collection = store.collection_name(),
                    model = %provider_config.model_name,
                    dimension = provider_config.dimension,
                    "Initializing collection with embedding configuration"
                );
                store
                    .store_config(&provider_config)
                    .await
                    .map_err(|e| IngestionError::StorageError(e.to_string()))?;
            }
            Some(stored) => {
                if provider_config.model_name != stored.model_name {
                    return Err(IngestionError::InvalidInput(format!(
                        "Embedding model mismatch: provider uses '{}' but storage has '{}'",
                        provider_config.model_name, stored.model_name
                    )));
                }
                if provider_config.dimension != stored.dimension {
                    return Err(IngestionError::InvalidInput(format!(
                        "Embedding dimension mismatch: provider has {} but storage has {}",
                        provider_config.dimension, stored.dimension
                    )));
                }
            }
        }

        Ok(Self {
            embedding_provider,
            store,
            source,
            shape: RecordShape::default(),
        })
    }

    /// Replace the primary-field mapping.
    pub fn with_shape(mut self, shape: RecordShape) -> Self {
        self.shape = shape;
        self
    }

    /// Fetch one paper and return its fields with the normalized text to embed.
    async fn fetch(&self, pmid: &str) -> IngestionResult<(PaperFields, String)> {
        let fields = self
            .source
            .fetch(pmid)
            .await
            .map_err(|e| IngestionError::FetchError(e.to_string()))?;

        let text = fields
            .get(&self.shape.text_key)
            .map(|t| normalize_text(t))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                IngestionError::InvalidInput(format!("paper {} has no '{}'", pmid, self.shape.text_key))
            })?;
        Ok((fields, text))
    }

    /// Embed all texts with one batch call, falling back to one call per text
    /// when the batch fails so a single bad text only costs its own item.
    async fn embed_all(&self, texts: &[&str]) -> Vec<IngestionResult<Vec<f32>>> {
        match self.embedding_provider.embed_batch(texts).await {
            Ok(embeddings) if embeddings.len() == texts.len() => {
                return embeddings.into_iter().map(Ok).collect();
            }
            Ok(embeddings) => warn!(
                expected = texts.len(),
                returned = embeddings.len(),
                "Batch embedding returned the wrong count, embedding one by one"
            ),
            Err(e) => warn!("Batch embedding failed, embedding one by one: {}", e),
        }

        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            let embedding = self
                .embedding_provider
                .embed(text)
                .await
                .map_err(|e| IngestionError::EmbeddingError(e.to_string()));
            results.push(embedding);
        }
        results
    }

    /// Ingest a batch of locators.
    ///
    /// Papers are fetched one by one and their texts embedded together.
    ///
    /// # Errors
    /// Only storage failures are returned; every other failure is logged and
    /// counted in `IngestionStats::failed`.
    pub async fn ingest(&self, locators: &[String]) -> IngestionResult<IngestionStats> {
        let created = Local::now().date_naive();
        let mut stats = IngestionStats::new();
        let mut fetched = Vec::new();

        for locator in locators {
            let pmid = match extract_pubmed_id(locator) {
                Ok(pmid) => pmid,
                Err(e) => {
                    warn!(locator = %locator, "{}", e);
                    stats.record_failed();
                    continue;
                }
            };

            // Only meaningful when records are keyed by PMID.
            if self.shape.id_key == DEFAULT_ID_KEY {
                let exists = self
                    .store
                    .contains(&pmid)
                    .await
                    .map_err(|e| IngestionError::StorageError(e.to_string()))?;
                if exists {
                    info!(id = %pmid, "ID already exists. Skip document");
                    stats.record_duplicate();
                    continue;
                }
            }

            match self.fetch(&pmid).await {
                Ok((fields, text)) => fetched.push((locator, pmid, fields, text)),
                Err(e) => {
                    warn!(locator = %locator, pmid = %pmid, "Skipping document: {}", e);
                    stats.record_failed();
                }
            }
        }

        if fetched.is_empty() {
            return Ok(stats);
        }

        let texts: Vec<&str> = fetched.iter().map(|(_, _, _, text)| text.as_str()).collect();
        let embeddings = self.embed_all(&texts).await;

        let mut records = Vec::with_capacity(fetched.len());
        for ((locator, pmid, fields, _), embedding) in fetched.into_iter().zip(embeddings) {
            let record = embedding
                .and_then(|embedding| check_magnitude(embedding, &pmid))
                .and_then(|embedding| self.shape.structure(fields, embedding, locator, created));
            match record {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(locator = %locator, pmid = %pmid, "Skipping document: {}", e);
                    stats.record_failed();
                }
            }
        }

        if records.is_empty() {
            return Ok(stats);
        }

        debug!(
            source = self.source.name(),
            batch = records.len(),
            "Storing fetched documents"
        );
        let summary = self
            .store
            .insert(&records)
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        for _ in &summary.inserted {
            stats.record_inserted();
        }
        for _ in &summary.skipped {
            stats.record_duplicate();
        }
        Ok(stats)
    }
}

/// A zero-magnitude embedding can never be ranked, so it is not stored.
fn check_magnitude(embedding: Vec<f32>, pmid: &str) -> IngestionResult<Vec<f32>> {
    if l2_norm(&embedding).is_none() {
        return Err(IngestionError::EmbeddingError(format!(
            "embedding for {} has zero magnitude",
            pmid
        )));
    }
    Ok(embedding)
}
