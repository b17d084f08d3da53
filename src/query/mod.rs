//! Query processing module.
//!
//! A question is embedded with the same model used during ingestion, the
//! whole collection is pulled from the store and ranked by cosine similarity,
//! and the best-matching abstract becomes the context handed to the answer
//! generator.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = QueryEngine::new(embedder, store, answerer);
//! let answer = engine.answer("What does BRCA1 regulate?").await?;
//! println!("{} ({})", answer.answer, answer.url);
//! ```

pub mod ranking;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::answer::AnswerProvider;
use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{Collection, QueryAnswer, RankedMatch, RetrievedDocument};
use crate::storage::DocumentStore;
pub use ranking::{cosine_similarity, RankError, Ranker, Ranking};

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding the question failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage access failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Ranking failed (including an empty collection)
    #[error("Ranking error: {0}")]
    RankingError(#[from] RankError),

    /// Answer generation failed
    #[error("Answer generation error: {0}")]
    AnswerError(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Retrieval-augmented query engine.
///
/// Holds shared handles to its collaborators; every call builds its own
/// `Ranker`, so concurrent queries never share ranking state.
pub struct QueryEngine<E: ?Sized, S: ?Sized, A: ?Sized> {
    embedding_provider: Arc<E>,
    store: Arc<S>,
    answerer: Arc<A>,
}

impl<E, S, A> QueryEngine<E, S, A>
where
    E: EmbeddingProvider + ?Sized,
    S: DocumentStore + ?Sized,
    A: AnswerProvider + ?Sized,
{
    pub fn new(embedding_provider: Arc<E>, store: Arc<S>, answerer: Arc<A>) -> Self {
        Self {
            embedding_provider,
            store,
            answerer,
        }
    }

    async fn embed_question(&self, question: &str) -> QueryResult<Vec<f32>> {
        let normalized = normalize_text(question);
        if normalized.is_empty() {
            return Err(QueryError::InvalidQuery(
                "query text must not be empty".to_string(),
            ));
        }
        self.embedding_provider
            .embed(&normalized)
            .await
            .map_err(|e| QueryError::EmbeddingError(e.to_string()))
    }

    async fn load_collection(&self) -> QueryResult<Collection> {
        let collection = self
            .store
            .fetch_all()
            .await
            .map_err(|e| QueryError::StorageError(e.to_string()))?;
        debug!(documents = collection.len(), "Loaded collection for ranking");
        Ok(collection)
    }

    async fn generate(
        &self,
        question: &str,
        collection: &Collection,
        best: RankedMatch,
    ) -> QueryResult<QueryAnswer> {
        let context = &collection.documents[best.index];
        let document_id = collection.ids[best.index].clone();
        info!(
            document_id = %document_id,
            score = best.score,
            "Selected context document"
        );

        let answer = self
            .answerer
            .generate_answer(question, context)
            .await
            .map_err(|e| QueryError::AnswerError(e.to_string()))?;

        Ok(QueryAnswer {
            question: question.to_string(),
            answer,
            url: collection.uris[best.index].clone(),
            document_id,
            score: best.score,
        })
    }

    /// Answer a question from the single most similar stored abstract.
    ///
    /// # Errors
    /// Any failure is fatal to the request: an unembeddable question, a store
    /// error, an empty collection (`RankError::EmptyCollection`), or an
    /// answer-generation failure. No partial answer is returned.
    pub async fn answer(&self, question: &str) -> QueryResult<QueryAnswer> {
        let query_embedding = self.embed_question(question).await?;
        let collection = self.load_collection().await?;

        let ranking = Ranker::new(&query_embedding, &collection.embeddings).rank()?;
        self.generate(question, &collection, ranking.best).await
    }

    /// Retrieve the `top_k` most similar documents without generating an answer.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> QueryResult<Vec<RetrievedDocument>> {
        let query_embedding = self.embed_question(question).await?;
        let collection = self.load_collection().await?;

        let matches = Ranker::new(&query_embedding, &collection.embeddings).rank_top_k(top_k)?;
        Ok(retrieved(&collection, &matches))
    }

    /// Answer a question and return its `top_k` matches from one ranking pass.
    ///
    /// The answer context is the first entry of the full ordering, which is
    /// the same document [`answer`](Self::answer) would pick.
    pub async fn answer_with_matches(
        &self,
        question: &str,
        top_k: usize,
    ) -> QueryResult<(QueryAnswer, Vec<RetrievedDocument>)> {
        let query_embedding = self.embed_question(question).await?;
        let collection = self.load_collection().await?;

        let mut ordered = Ranker::new(&query_embedding, &collection.embeddings).ordered()?;
        let best = ordered[0];
        ordered.truncate(top_k);

        let answer = self.generate(question, &collection, best).await?;
        Ok((answer, retrieved(&collection, &ordered)))
    }
}

fn retrieved(collection: &Collection, matches: &[RankedMatch]) -> Vec<RetrievedDocument> {
    matches
        .iter()
        .enumerate()
        .map(|(rank, m)| RetrievedDocument {
            rank: rank + 1,
            id: collection.ids[m.index].clone(),
            url: collection.uris[m.index].clone(),
            text: collection.documents[m.index].clone(),
            metadata: collection.metadatas[m.index].clone(),
            score: m.score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::{AnswerError, AnswerResult};
    use crate::embedding::{EmbeddingError, EmbeddingResult};
    use crate::models::{DocumentRecord, Metadata};
    use crate::storage::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns a preset vector per (normalized) question text.
    struct MockEmbeddingProvider {
        vectors: HashMap<String, Vec<f32>>,
        should_fail: bool,
        calls: AtomicUsize,
    }

    impl MockEmbeddingProvider {
        fn new(vectors: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: vectors
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.clone()))
                    .collect(),
                should_fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_failure() -> Self {
            Self {
                vectors: HashMap::new(),
                should_fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                return Err(EmbeddingError::InferenceError("Mock embedding failure".to_string()));
            }
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| EmbeddingError::InvalidInput(format!("no vector for '{}'", text)))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let mut results = Vec::new();
            for text in texts {
                results.push(self.embed(text).await?);
            }
            Ok(results)
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    /// Echoes the context back and records every call.
    #[derive(Default)]
    struct MockAnswerer {
        calls: Mutex<Vec<(String, String)>>,
        should_fail: bool,
    }

    #[async_trait]
    impl AnswerProvider for MockAnswerer {
        async fn generate_answer(&self, question: &str, context: &str) -> AnswerResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((question.to_string(), context.to_string()));
            if self.should_fail {
                return Err(AnswerError::ApiError("Mock answer failure".to_string()));
            }
            Ok(format!("answer from: {}", context))
        }

        fn model_name(&self) -> &str {
            "mock-llm"
        }
    }

    fn record(id: &str, embedding: Vec<f32>) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            text: format!("abstract {}", id),
            embedding,
            url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", id),
            metadata: Metadata::new(),
        }
    }

    async fn toy_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new("test"));
        store
            .insert(&[
                record("a", vec![1.0, 0.0]),
                record("b", vec![0.0, 1.0]),
                record("c", vec![0.9, 0.1]),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_answer_uses_best_matching_context() {
        let embedder = Arc::new(MockEmbeddingProvider::new(&[("what is a?", vec![1.0, 0.0])]));
        let answerer = Arc::new(MockAnswerer::default());
        let engine = QueryEngine::new(embedder, toy_store().await, answerer.clone());

        let answer = engine.answer("What is A?").await.unwrap();

        assert_eq!(answer.question, "What is A?");
        assert_eq!(answer.document_id, "a");
        assert_eq!(answer.url, "https://pubmed.ncbi.nlm.nih.gov/a/");
        assert!((answer.score - 1.0).abs() < 1e-6);
        assert_eq!(answer.answer, "answer from: abstract a");

        let calls = answerer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("What is A?".to_string(), "abstract a".to_string()));
    }

    #[tokio::test]
    async fn test_empty_store_is_reported() {
        let embedder = Arc::new(MockEmbeddingProvider::new(&[("question", vec![1.0, 0.0])]));
        let answerer = Arc::new(MockAnswerer::default());
        let engine = QueryEngine::new(embedder, Arc::new(InMemoryStore::new("empty")), answerer.clone());

        match engine.answer("question").await {
            Err(QueryError::RankingError(RankError::EmptyCollection)) => {}
            other => panic!("Expected EmptyCollection, got {:?}", other),
        }
        assert!(answerer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_fatal() {
        let engine = QueryEngine::new(
            Arc::new(MockEmbeddingProvider::with_failure()),
            toy_store().await,
            Arc::new(MockAnswerer::default()),
        );

        match engine.answer("question").await {
            Err(QueryError::EmbeddingError(_)) => {}
            other => panic!("Expected EmbeddingError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let engine = QueryEngine::new(
            Arc::new(MockEmbeddingProvider::new(&[])),
            toy_store().await,
            Arc::new(MockAnswerer::default()),
        );

        assert!(matches!(
            engine.answer("   ").await,
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_answer_failure_propagates() {
        let answerer = Arc::new(MockAnswerer {
            should_fail: true,
            ..Default::default()
        });
        let engine = QueryEngine::new(
            Arc::new(MockEmbeddingProvider::new(&[("question", vec![0.0, 1.0])])),
            toy_store().await,
            answerer,
        );

        assert!(matches!(
            engine.answer("question").await,
            Err(QueryError::AnswerError(_))
        ));
    }

    #[tokio::test]
    async fn test_retrieve_orders_documents() {
        let engine = QueryEngine::new(
            Arc::new(MockEmbeddingProvider::new(&[("question", vec![1.0, 0.0])])),
            toy_store().await,
            Arc::new(MockAnswerer::default()),
        );

        let results = engine.retrieve("question", 3).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();

        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(results[0].rank, 1);
        assert!(results[1].score > results[2].score);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_surfaces() {
        let engine = QueryEngine::new(
            Arc::new(MockEmbeddingProvider::new(&[("question", vec![1.0, 0.0, 0.0])])),
            toy_store().await,
            Arc::new(MockAnswerer::default()),
        );

        assert!(matches!(
            engine.answer("question").await,
            Err(QueryError::RankingError(RankError::DimensionMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_answer_with_matches_embeds_once() {
        let embedder = Arc::new(MockEmbeddingProvider::new(&[("question", vec![1.0, 0.0])]));
        let answerer = Arc::new(MockAnswerer::default());
        let engine = QueryEngine::new(embedder.clone(), toy_store().await, answerer.clone());

        let (answer, matches) = engine.answer_with_matches("question", 2).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(answerer.calls.lock().unwrap().len(), 1);
        assert_eq!(answer.document_id, "a");
        let ids: Vec<&str> = matches.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(matches[0].id, answer.document_id);
    }

    #[tokio::test]
    async fn test_answer_with_matches_empty_store() {
        let engine = QueryEngine::new(
            Arc::new(MockEmbeddingProvider::new(&[("question", vec![1.0, 0.0])])),
            Arc::new(InMemoryStore::new("empty")),
            Arc::new(MockAnswerer::default()),
        );

        assert!(matches!(
            engine.answer_with_matches("question", 3).await,
            Err(QueryError::RankingError(RankError::EmptyCollection))
        ));
    }
}
