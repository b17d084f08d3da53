//! Core data models for the PubMed question-answering service.
//!
//! This module contains the records persisted by the document store, the
//! index-aligned collection returned when the store is enumerated, and the
//! result types produced by ranking and answering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form string metadata attached to a stored document.
pub type Metadata = BTreeMap<String, String>;

/// A single stored document: one PubMed abstract and its embedding.
///
/// Records are created during ingestion and never mutated afterwards. The
/// identifier is the PubMed ID and is unique within a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// Stable external identifier (PMID)
    pub id: String,

    /// Abstract text, used as answer context
    pub text: String,

    /// Vector embedding of the abstract
    pub embedding: Vec<f32>,

    /// Source locator the document was ingested from
    pub url: String,

    /// Everything that is not a primary field, stringified
    pub metadata: Metadata,
}

/// The full contents of a document store, index-aligned.
///
/// Position `i` of every list refers to the same underlying record. Records
/// appear in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub uris: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

impl Collection {
    /// Number of records in the collection.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append a record, keeping every list aligned.
    pub fn push(&mut self, record: DocumentRecord) {
        self.ids.push(record.id);
        self.documents.push(record.text);
        self.embeddings.push(record.embedding);
        self.uris.push(record.url);
        self.metadatas.push(record.metadata);
    }

    /// Reassemble the record stored at `index`.
    pub fn record(&self, index: usize) -> Option<DocumentRecord> {
        Some(DocumentRecord {
            id: self.ids.get(index)?.clone(),
            text: self.documents.get(index)?.clone(),
            embedding: self.embeddings.get(index)?.clone(),
            url: self.uris.get(index)?.clone(),
            metadata: self.metadatas.get(index)?.clone(),
        })
    }
}

impl FromIterator<DocumentRecord> for Collection {
    fn from_iter<I: IntoIterator<Item = DocumentRecord>>(iter: I) -> Self {
        let mut collection = Collection::default();
        for record in iter {
            collection.push(record);
        }
        collection
    }
}

/// Position and cosine similarity of a ranked document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RankedMatch {
    /// Index into the collection that was ranked
    pub index: usize,

    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Configuration for the embedding model.
///
/// Persisted alongside the documents so that query-time embeddings are
/// produced by the same model that embedded the stored abstracts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "all-MiniLM-L6-v2")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}

/// A generated answer together with the document it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub question: String,
    pub answer: String,
    /// Source locator of the matched document
    pub url: String,
    pub document_id: String,
    pub score: f32,
}

/// A document returned by retrieval, without answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// 1-based rank
    pub rank: usize,
    pub id: String,
    pub url: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}
