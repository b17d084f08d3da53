//! SQLite storage implementation.
//!
//! This module provides a SQLite-based implementation of the `DocumentStore`
//! trait. It uses rusqlite for database access and stores embeddings as BLOBs.
//!
//! # Schema
//! - `config`: key/value pairs (collection name, embedding configuration as JSON)
//! - `documents`: one row per record; `id` is `UNIQUE` so the database rejects
//!   duplicates even if two writers race

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{DocumentStore, InsertSummary, StorageError, StorageResult};
use crate::models::{Collection, DocumentRecord, EmbeddingConfig, Metadata};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS documents (
        seq       INTEGER PRIMARY KEY AUTOINCREMENT,
        id        TEXT NOT NULL UNIQUE,
        text      TEXT NOT NULL,
        embedding BLOB NOT NULL,
        url       TEXT NOT NULL,
        metadata  TEXT NOT NULL
    );
";

const COLLECTION_KEY: &str = "collection";
const EMBEDDING_CONFIG_KEY: &str = "embedding_config";

fn query_err(e: rusqlite::Error) -> StorageError {
    StorageError::QueryError(e.to_string())
}

/// SQLite-based document store.
///
/// One database file holds one collection. The connection sits behind a
/// mutex; every operation is a short synchronous critical section.
pub struct SqliteStore {
    collection_name: String,
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file for `collection_name`.
    ///
    /// # Errors
    /// Returns `StorageError::SchemaError` if the file already belongs to a
    /// different collection.
    pub fn open(path: impl AsRef<Path>, collection_name: &str) -> StorageResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Opening SQLite store");
        let connection = Connection::open(path)
            .map_err(|e| StorageError::ConnectionError(format!("{}: {}", path.display(), e)))?;
        Self::with_connection(connection, collection_name)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(collection_name: &str) -> StorageResult<Self> {
        let connection =
            Connection::open_in_memory().map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Self::with_connection(connection, collection_name)
    }

    fn with_connection(connection: Connection, collection_name: &str) -> StorageResult<Self> {
        connection
            .execute_batch(SCHEMA)
            .map_err(|e| StorageError::SchemaError(e.to_string()))?;

        let existing: Option<String> = connection
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![COLLECTION_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;

        match existing {
            Some(name) if name != collection_name => {
                return Err(StorageError::SchemaError(format!(
                    "database holds collection '{}', not '{}'",
                    name, collection_name
                )));
            }
            Some(_) => {}
            None => {
                connection
                    .execute(
                        "INSERT INTO config (key, value) VALUES (?1, ?2)",
                        params![COLLECTION_KEY, collection_name],
                    )
                    .map_err(query_err)?;
                info!(collection = collection_name, "Created collection");
            }
        }

        Ok(Self {
            collection_name: collection_name.to_string(),
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| StorageError::Other("SQLite connection lock poisoned".to_string()))
    }

    /// Serialize an embedding vector to little-endian bytes for BLOB storage.
    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Deserialize an embedding vector from BLOB bytes.
    fn deserialize_embedding(bytes: &[u8]) -> StorageResult<Vec<f32>> {
        if bytes.len() % 4 != 0 {
            return Err(StorageError::SerializationError(format!(
                "embedding blob length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()> {
        let value = serde_json::to_string(config)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.lock()?
            .execute(
                "INSERT INTO config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![EMBEDDING_CONFIG_KEY, value],
            )
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
        let value: Option<String> = self
            .lock()?
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![EMBEDDING_CONFIG_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;

        value
            .map(|v| {
                serde_json::from_str(&v).map_err(|e| StorageError::SerializationError(e.to_string()))
            })
            .transpose()
    }

    async fn contains(&self, id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .lock()?
            .query_row(
                "SELECT seq FROM documents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;
        Ok(found.is_some())
    }

    async fn insert(&self, batch: &[DocumentRecord]) -> StorageResult<InsertSummary> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(query_err)?;
        let mut summary = InsertSummary::default();

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO documents (id, text, embedding, url, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(query_err)?;

            for record in batch {
                let metadata = serde_json::to_string(&record.metadata)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))?;
                let changed = stmt
                    .execute(params![
                        record.id,
                        record.text,
                        Self::serialize_embedding(&record.embedding),
                        record.url,
                        metadata,
                    ])
                    .map_err(query_err)?;

                if changed == 0 {
                    info!(id = %record.id, "ID already exists. Skip document");
                    summary.skipped.push(record.id.clone());
                } else {
                    summary.inserted.push(record.id.clone());
                }
            }
        }

        tx.commit().map_err(query_err)?;
        Ok(summary)
    }

    async fn fetch_all(&self) -> StorageResult<Collection> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, text, embedding, url, metadata FROM documents ORDER BY seq")
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let text: String = row.get(1)?;
                let embedding: Vec<u8> = row.get(2)?;
                let url: String = row.get(3)?;
                let metadata: String = row.get(4)?;
                Ok((id, text, embedding, url, metadata))
            })
            .map_err(query_err)?;

        let mut collection = Collection::default();
        for row in rows {
            let (id, text, embedding, url, metadata) = row.map_err(query_err)?;
            let metadata: Metadata = serde_json::from_str(&metadata)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            collection.push(DocumentRecord {
                id,
                text,
                embedding: Self::deserialize_embedding(&embedding)?,
                url,
                metadata,
            });
        }
        Ok(collection)
    }

    async fn count(&self) -> StorageResult<usize> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(query_err)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, embedding: Vec<f32>) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            text: format!("abstract {}", id),
            embedding,
            url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", id),
            metadata: Metadata::from([
                ("title".to_string(), format!("Title {}", id)),
                ("created".to_string(), "2024-01-01".to_string()),
            ]),
        }
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let embedding = vec![0.25, -1.5, 3.0e-7, f32::MAX];
        let bytes = SqliteStore::serialize_embedding(&embedding);
        assert_eq!(bytes.len(), 16);
        assert_eq!(SqliteStore::deserialize_embedding(&bytes).unwrap(), embedding);
    }

    #[test]
    fn test_rejects_truncated_blob() {
        assert!(matches!(
            SqliteStore::deserialize_embedding(&[0, 0, 128]),
            Err(StorageError::SerializationError(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_and_fetch_all() {
        let store = SqliteStore::open_in_memory("papers").unwrap();
        let summary = store
            .insert(&[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(summary.inserted, vec!["a", "b"]);

        let collection = store.fetch_all().await.unwrap();
        assert_eq!(collection.ids, vec!["a", "b"]);
        assert_eq!(collection.embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(collection.uris[1], "https://pubmed.ncbi.nlm.nih.gov/b/");
        assert_eq!(collection.metadatas[0]["title"], "Title a");
    }

    #[tokio::test]
    async fn test_duplicate_id_is_skipped() {
        let store = SqliteStore::open_in_memory("papers").unwrap();
        store.insert(&[record("a", vec![1.0, 0.0])]).await.unwrap();

        let mut replacement = record("a", vec![0.0, 1.0]);
        replacement.text = "replacement".to_string();
        let summary = store.insert(&[replacement]).await.unwrap();

        assert_eq!(summary.skipped, vec!["a"]);
        assert!(summary.inserted.is_empty());
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.fetch_all().await.unwrap().documents, vec!["abstract a"]);
        assert!(store.contains("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers.db");
        let config = EmbeddingConfig {
            model_name: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
        };

        {
            let store = SqliteStore::open(&path, "PubMed_research_papers").unwrap();
            store.store_config(&config).await.unwrap();
            store.insert(&[record("15858239", vec![0.1, 0.2])]).await.unwrap();
        }

        let store = SqliteStore::open(&path, "PubMed_research_papers").unwrap();
        assert_eq!(store.get_config().await.unwrap(), Some(config));
        assert_eq!(store.fetch_all().await.unwrap().ids, vec!["15858239"]);
    }

    #[tokio::test]
    async fn test_rejects_other_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers.db");
        SqliteStore::open(&path, "first").unwrap();

        assert!(matches!(
            SqliteStore::open(&path, "second"),
            Err(StorageError::SchemaError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_config_is_none() {
        let store = SqliteStore::open_in_memory("papers").unwrap();
        assert_eq!(store.get_config().await.unwrap(), None);
    }
}
