//! PubMed RAG - retrieval-augmented question answering over PubMed abstracts.
//!
//! Papers are ingested by PubMed URL: the abstract is fetched from NCBI,
//! embedded and stored. A question is embedded with the same model, compared
//! against every stored abstract by cosine similarity, and the best match is
//! handed to a generative model as the context for its answer.
//!
//! # Architecture
//!
//! - **models**: Stored records, index-aligned collections, answer types
//! - **embedding**: Text embedding (FastEmbed) and normalization
//! - **provider**: Paper sources (NCBI E-utilities)
//! - **storage**: Document stores (in-memory and SQLite)
//! - **query**: Cosine ranking and the query engine
//! - **answer**: Answer generation (Vertex AI Gemini)
//! - **ingestion**: URL-to-record ingestion pipeline
//! - **server**: HTTP API
//! - **config**: Settings and collaborator construction
//!
//! # Example
//!
//! ```ignore
//! use pubmed_rag::{config::AppConfig, ingestion::IngestionPipeline, query::QueryEngine};
//!
//! let config = AppConfig::default();
//! let store = config.open_store()?;
//! let embedder = config.embedder()?;
//!
//! let pipeline = IngestionPipeline::connect(embedder.clone(), store.clone(), config.paper_source()?).await?;
//! pipeline.ingest(&["https://pubmed.ncbi.nlm.nih.gov/15858239/".to_string()]).await?;
//!
//! let engine = QueryEngine::new(embedder, store, config.answerer()?);
//! let answer = engine.answer("What is the role of BRCA1?").await?;
//! println!("{} ({})", answer.answer, answer.url);
//! ```

pub mod answer;
pub mod config;
pub mod embedding;
pub mod ingestion;
pub mod models;
pub mod provider;
pub mod query;
pub mod server;
pub mod storage;
pub mod telemetry;

pub use answer::AnswerProvider;
pub use embedding::EmbeddingProvider;
pub use models::{Collection, DocumentRecord, EmbeddingConfig, QueryAnswer, RankedMatch};
pub use provider::PaperSource;
pub use storage::DocumentStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
