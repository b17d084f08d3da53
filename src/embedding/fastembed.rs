//! FastEmbed embedding provider implementation.
//!
//! Runs sentence-transformer models locally through the fastembed library. The
//! default model is all-MiniLM-L6-v2, which produces 384-dimensional vectors.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default sentence-transformer model name.
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// FastEmbed embedding provider.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance (wrapped in Arc<Mutex> for thread-safety)
    model: Arc<Mutex<TextEmbedding>>,

    /// Model identifier as configured by the caller
    model_name: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

/// Resolve a sentence-transformers style model name to a fastembed model and
/// its output dimension.
///
/// Both the short name (`all-MiniLM-L6-v2`) and the hub name
/// (`sentence-transformers/all-MiniLM-L6-v2`) are accepted, case-insensitively.
pub fn resolve_model(name: &str) -> EmbeddingResult<(EmbeddingModel, usize)> {
    let lowered = name.trim().to_lowercase();
    let short = lowered.rsplit('/').next().unwrap_or(lowered.as_str());
    let resolved = match short {
        "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "all-minilm-l12-v2" => (EmbeddingModel::AllMiniLML12V2, 384),
        "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        "nomic-embed-text-v1" => (EmbeddingModel::NomicEmbedTextV1, 768),
        "nomic-embed-text-v1.5" => (EmbeddingModel::NomicEmbedTextV15, 768),
        "paraphrase-multilingual-minilm-l12-v2" => (EmbeddingModel::ParaphraseMLMiniLML12V2, 384),
        "paraphrase-multilingual-mpnet-base-v2" => (EmbeddingModel::ParaphraseMLMpnetBaseV2, 768),
        _ => {
            return Err(EmbeddingError::ConfigError(format!(
                "Unsupported embedding model '{}'",
                name
            )))
        }
    };
    Ok(resolved)
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `model_name` - Model to load (see [`resolve_model`])
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the model is unknown or fails to load
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let (model_type, embedding_dimension) = resolve_model(model_name)?;

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            debug!(cache_dir = %dir.display(), "Using FastEmbed cache directory");
            init_options = init_options.with_cache_dir(dir);
        }

        info!(model = model_name, "Loading FastEmbed model");
        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name: model_name.to_string(),
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        let mut model = self.model.lock().await;
        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::InferenceError(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "All texts must be non-empty".to_string(),
            ));
        }

        let mut model = self.model.lock().await;
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let embeddings = model
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::InferenceError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::Other(format!(
                "FastEmbed returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding does not implement Debug
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}
