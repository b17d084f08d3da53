//! Service configuration.
//!
//! `AppConfig` carries the settings shared by the server and the command-line
//! tools and knows how to build each collaborator from them. `ServiceArgs` is
//! the clap view of the same settings, with environment-variable fallbacks,
//! meant to be flattened into each binary's argument parser.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use thiserror::Error;
use tracing::info;

use crate::answer::vertex::{
    resolve_credentials, VertexConfig, VertexGeminiAnswerer, ACCESS_TOKEN_ENV, DEFAULT_LOCATION,
    DEFAULT_MODEL,
};
use crate::answer::{AnswerError, AnswerProvider};
use crate::embedding::fastembed::{FastEmbedProvider, DEFAULT_MODEL_NAME};
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::provider::pubmed::{PubMedClient, DEFAULT_EUTILS_URL};
use crate::provider::{PaperSource, ProviderError};
use crate::storage::memory::InMemoryStore;
use crate::storage::sqlite::SqliteStore;
use crate::storage::{DocumentStore, StorageError};

pub const DEFAULT_CREDENTIALS_PATH: &str = "CREDENTIALS.json";
pub const DEFAULT_PROJECT_ID: &str = "PROJECT_NAME";
pub const DEFAULT_COLLECTION: &str = "PubMed_research_papers";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Papers ingested by the server before it starts listening.
pub const DEFAULT_SEED_URLS: [&str; 3] = [
    "https://pubmed.ncbi.nlm.nih.gov/15858239/",
    "https://pubmed.ncbi.nlm.nih.gov/20598273/",
    "https://pubmed.ncbi.nlm.nih.gov/6650562/",
];

/// Errors raised while building collaborators from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open document store: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to initialize embedding model: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Failed to initialize answer model: {0}")]
    Answer(#[from] AnswerError),

    #[error("Failed to initialize paper source: {0}")]
    Provider(#[from] ProviderError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Clone)]
pub struct AppConfig {
    /// Service-account key (or access token) for Vertex AI
    pub credentials_path: PathBuf,
    pub project_id: String,
    pub location: String,
    pub collection_name: String,
    pub embedding_model: String,
    pub generative_model: String,
    /// SQLite database file; an in-memory store is used when absent
    pub db_path: Option<PathBuf>,
    /// FastEmbed model cache directory
    pub cache_dir: Option<PathBuf>,
    pub eutils_url: String,
    pub ncbi_api_key: Option<String>,
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            project_id: DEFAULT_PROJECT_ID.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            collection_name: DEFAULT_COLLECTION.to_string(),
            embedding_model: DEFAULT_MODEL_NAME.to_string(),
            generative_model: DEFAULT_MODEL.to_string(),
            db_path: None,
            cache_dir: None,
            eutils_url: DEFAULT_EUTILS_URL.to_string(),
            ncbi_api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    /// Cache directory for FastEmbed models, defaulting to the platform
    /// cache dir.
    pub fn fastembed_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("fastembed")))
    }

    pub fn open_store(&self) -> ConfigResult<Arc<dyn DocumentStore>> {
        match &self.db_path {
            Some(path) => {
                info!(path = %path.display(), collection = %self.collection_name, "Opening SQLite store");
                Ok(Arc::new(SqliteStore::open(path, &self.collection_name)?))
            }
            None => {
                info!(collection = %self.collection_name, "Using in-memory store");
                Ok(Arc::new(InMemoryStore::new(self.collection_name.clone())))
            }
        }
    }

    pub fn embedder(&self) -> ConfigResult<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(FastEmbedProvider::new(
            &self.embedding_model,
            self.fastembed_cache_dir(),
        )?))
    }

    pub fn paper_source(&self) -> ConfigResult<Arc<dyn PaperSource>> {
        Ok(Arc::new(PubMedClient::new(
            self.eutils_url.clone(),
            self.ncbi_api_key.clone(),
            self.request_timeout,
        )?))
    }

    /// Build the Vertex AI answerer. The token in `VERTEX_ACCESS_TOKEN`
    /// overrides the credentials file.
    pub fn answerer(&self) -> ConfigResult<Arc<dyn AnswerProvider>> {
        let credentials =
            resolve_credentials(&self.credentials_path, std::env::var(ACCESS_TOKEN_ENV).ok())?;
        let config = VertexConfig {
            project_id: self.project_id.clone(),
            location: self.location.clone(),
            model: self.generative_model.clone(),
            credentials,
        };
        Ok(Arc::new(VertexGeminiAnswerer::new(config, self.request_timeout)?))
    }
}

/// Command-line and environment settings shared by every binary.
#[derive(Args, Clone)]
pub struct ServiceArgs {
    /// Service-account key file (or a file holding an access token) for Vertex AI
    #[arg(long, env = "CREDENTIALS_PATH", default_value = DEFAULT_CREDENTIALS_PATH)]
    pub credentials: PathBuf,

    /// Google Cloud project id
    #[arg(long, env = "PROJECT_ID", default_value = DEFAULT_PROJECT_ID)]
    pub project_id: String,

    /// Vertex AI location
    #[arg(long, env = "VERTEX_LOCATION", default_value = DEFAULT_LOCATION)]
    pub location: String,

    /// Generative model used to answer questions
    #[arg(long, env = "GENERATIVE_MODEL", default_value = DEFAULT_MODEL)]
    pub generative_model: String,

    /// Collection name
    #[arg(long, env = "COLLECTION_NAME", default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_MODEL_NAME)]
    pub embedding_model: String,

    /// SQLite database file (in-memory store when omitted)
    #[arg(long, env = "DB_PATH", value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// FastEmbed model cache directory
    #[arg(long, env = "FASTEMBED_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// NCBI E-utilities base URL
    #[arg(long, env = "EUTILS_URL", default_value = DEFAULT_EUTILS_URL)]
    pub eutils_url: String,

    /// NCBI API key
    #[arg(long, env = "NCBI_API_KEY")]
    pub ncbi_api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("credentials_path", &self.credentials_path)
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("collection_name", &self.collection_name)
            .field("embedding_model", &self.embedding_model)
            .field("generative_model", &self.generative_model)
            .field("db_path", &self.db_path)
            .field("cache_dir", &self.cache_dir)
            .field("eutils_url", &self.eutils_url)
            .field("ncbi_api_key", &redact(&self.ncbi_api_key))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl std::fmt::Debug for ServiceArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceArgs")
            .field("credentials", &self.credentials)
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("generative_model", &self.generative_model)
            .field("collection", &self.collection)
            .field("embedding_model", &self.embedding_model)
            .field("db_path", &self.db_path)
            .field("cache_dir", &self.cache_dir)
            .field("eutils_url", &self.eutils_url)
            .field("ncbi_api_key", &redact(&self.ncbi_api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl From<ServiceArgs> for AppConfig {
    fn from(args: ServiceArgs) -> Self {
        Self {
            credentials_path: args.credentials,
            project_id: args.project_id,
            location: args.location,
            collection_name: args.collection,
            embedding_model: args.embedding_model,
            generative_model: args.generative_model,
            db_path: args.db_path,
            cache_dir: args.cache_dir,
            eutils_url: args.eutils_url,
            ncbi_api_key: args.ncbi_api_key,
            request_timeout: Duration::from_secs(args.timeout_secs),
        }
    }
}
