//! In-memory document store.
//!
//! Lives for the lifetime of the process. Suitable for the server's default
//! mode, where the seed documents are re-ingested on every start.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{DocumentStore, InsertSummary, StorageResult};
use crate::models::{Collection, DocumentRecord, EmbeddingConfig};

#[derive(Default)]
struct MemoryState {
    records: Vec<DocumentRecord>,
    ids: HashSet<String>,
    config: Option<EmbeddingConfig>,
}

/// Document store backed by a vector behind an async `RwLock`.
///
/// The write lock is held for a whole batch, so two concurrent inserts of the
/// same identifier cannot both succeed.
pub struct InMemoryStore {
    collection_name: String,
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            state: RwLock::new(MemoryState::default()),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()> {
        self.state.write().await.config = Some(config.clone());
        Ok(())
    }

    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
        Ok(self.state.read().await.config.clone())
    }

    async fn contains(&self, id: &str) -> StorageResult<bool> {
        Ok(self.state.read().await.ids.contains(id))
    }

    async fn insert(&self, batch: &[DocumentRecord]) -> StorageResult<InsertSummary> {
        debug!(
            collection = %self.collection_name,
            batch = batch.len(),
            "Inserting documents"
        );
        let mut state = self.state.write().await;
        let mut summary = InsertSummary::default();

        for record in batch {
            if !state.ids.insert(record.id.clone()) {
                info!(id = %record.id, "ID already exists. Skip document");
                summary.skipped.push(record.id.clone());
                continue;
            }
            state.records.push(record.clone());
            summary.inserted.push(record.id.clone());
        }
        Ok(summary)
    }

    async fn fetch_all(&self) -> StorageResult<Collection> {
        Ok(self.state.read().await.records.iter().cloned().collect())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.state.read().await.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use std::sync::Arc;

    fn record(id: &str, text: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            text: text.to_string(),
            embedding: vec![1.0, 0.0],
            url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", id),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_one_record() {
        let store = InMemoryStore::new("test");

        let first = store.insert(&[record("1", "original")]).await.unwrap();
        let second = store.insert(&[record("1", "replacement")]).await.unwrap();

        assert_eq!(first.inserted, vec!["1"]);
        assert_eq!(second.skipped, vec!["1"]);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.fetch_all().await.unwrap().documents, vec!["original"]);
    }

    #[tokio::test]
    async fn test_duplicate_within_batch() {
        let store = InMemoryStore::new("test");
        let summary = store
            .insert(&[record("1", "a"), record("2", "b"), record("1", "c")])
            .await
            .unwrap();

        assert_eq!(summary.inserted, vec!["1", "2"]);
        assert_eq!(summary.skipped, vec!["1"]);
        assert!(store.contains("2").await.unwrap());
        assert!(!store.contains("3").await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_insertion_order() {
        let store = InMemoryStore::new("test");
        store.insert(&[record("9", "nine")]).await.unwrap();
        store.insert(&[record("3", "three"), record("5", "five")]).await.unwrap();

        let collection = store.fetch_all().await.unwrap();
        assert_eq!(collection.ids, vec!["9", "3", "5"]);
        assert_eq!(collection.documents, vec!["nine", "three", "five"]);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_of_same_id() {
        let store = Arc::new(InMemoryStore::new("test"));
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert(&[record("same", &format!("copy {}", i))]).await
            }));
        }
        let mut inserted = 0;
        for handle in handles {
            inserted += handle.await.unwrap().unwrap().inserted.len();
        }

        assert_eq!(inserted, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let store = InMemoryStore::new("test");
        assert_eq!(store.get_config().await.unwrap(), None);

        let config = EmbeddingConfig {
            model_name: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
        };
        store.store_config(&config).await.unwrap();
        assert_eq!(store.get_config().await.unwrap(), Some(config));
        assert_eq!(store.collection_name(), "test");
    }
}
