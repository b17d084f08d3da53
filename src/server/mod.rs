//! HTTP server module.
//!
//! Exposes ingestion and question answering over a small JSON API:
//!
//! - `POST /ingest/` with `{"document": "<pubmed url>"}` responds `{"status": "ok"}`
//! - `POST /query` with `{"query": "..."}` responds `{"question:": ..., "answer": ..., "url": ...}`
//! - `GET /healthz` reports the number of stored documents
//!
//! Errors are returned as `{"error": "..."}` with a non-2xx status.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::answer::AnswerProvider;
use crate::embedding::EmbeddingProvider;
use crate::ingestion::{IngestionError, IngestionPipeline};
use crate::provider::PaperSource;
use crate::query::{QueryEngine, QueryError, RankError};
use crate::storage::DocumentStore;

/// Ingestion pipeline over trait objects, as the server holds it.
pub type DynIngestionPipeline = IngestionPipeline<dyn EmbeddingProvider, dyn DocumentStore, dyn PaperSource>;

/// Query engine over trait objects, as the server holds it.
pub type DynQueryEngine = QueryEngine<dyn EmbeddingProvider, dyn DocumentStore, dyn AnswerProvider>;

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Seeding the collection failed
    #[error("Initialization error: {0}")]
    InitializationError(#[from] IngestionError),

    /// The listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Listener address and documents to ingest before accepting requests.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub seed_urls: Vec<String>,
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<DynIngestionPipeline>,
    engine: Arc<DynQueryEngine>,
    store: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(pipeline: DynIngestionPipeline, engine: DynQueryEngine, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            engine: Arc::new(engine),
            store,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub document: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    // The trailing colon is part of the published response format.
    #[serde(rename = "question:")]
    pub question: String,
    pub answer: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub documents: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn query_error(err: QueryError) -> ApiError {
    let status = match &err {
        QueryError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        QueryError::RankingError(RankError::EmptyCollection) => StatusCode::NOT_FOUND,
        QueryError::EmbeddingError(_) | QueryError::AnswerError(_) => StatusCode::BAD_GATEWAY,
        QueryError::StorageError(_) | QueryError::RankingError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Query failed: {}", err);
    } else {
        warn!("Query rejected: {}", err);
    }
    error_response(status, err.to_string())
}

fn ingestion_error(err: IngestionError) -> ApiError {
    error!("Ingestion failed: {}", err);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

async fn ingest_handler(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let stats = state
        .pipeline
        .ingest(&[request.document])
        .await
        .map_err(ingestion_error)?;
    info!(
        inserted = stats.inserted,
        duplicates = stats.duplicates_skipped,
        failed = stats.failed,
        "Handled ingest request"
    );
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let answer = state.engine.answer(&request.query).await.map_err(query_error)?;
    Ok(Json(QueryResponse {
        question: answer.question,
        answer: answer.answer,
        url: answer.url,
    }))
}

async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let documents = state
        .store
        .count()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        documents,
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingest/", post(ingest_handler))
        .route("/query", post(query_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

/// Ingest the seed documents, then serve until interrupted.
///
/// # Errors
/// Fails if seeding hits a storage error, or the listener cannot be bound.
pub async fn run(config: ServerConfig, state: AppState) -> ServerResult<()> {
    if !config.seed_urls.is_empty() {
        let stats = state.pipeline.ingest(&config.seed_urls).await?;
        info!(
            inserted = stats.inserted,
            duplicates = stats.duplicates_skipped,
            failed = stats.failed,
            "Seeded collection"
        );
    }

    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
    info!(addr = %config.bind, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}
