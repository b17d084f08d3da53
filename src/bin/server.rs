//! HTTP server entry point.
//!
//! Ingests the seed papers, then serves `/ingest/`, `/query` and `/healthz`.
//!
//! # Examples
//!
//! ```bash
//! VERTEX_ACCESS_TOKEN=$(gcloud auth print-access-token) server --project-id my-project
//! server --db-path papers.db --bind 0.0.0.0:8000 --no-seed
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use pubmed_rag::{
    config::{AppConfig, ServiceArgs, DEFAULT_SEED_URLS},
    ingestion::IngestionPipeline,
    query::QueryEngine,
    server::{self, AppState, ServerConfig},
    telemetry::init_logging,
    AnswerProvider, EmbeddingProvider,
};
use tracing::{debug, info};

/// Question-answering server over PubMed abstracts
#[derive(Parser, Debug)]
#[command(name = "server", version, about = "Serve retrieval-augmented answers over PubMed abstracts")]
struct ServerArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Seed paper URL to ingest at startup (repeatable; replaces the default set)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Skip seeding entirely
    #[arg(long, conflicts_with = "seeds")]
    no_seed: bool,
}

impl ServerArgs {
    fn seed_urls(&self) -> Vec<String> {
        if self.no_seed {
            Vec::new()
        } else if self.seeds.is_empty() {
            DEFAULT_SEED_URLS.iter().map(|url| url.to_string()).collect()
        } else {
            self.seeds.clone()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_logging(&args.service.log_level).context("Failed to initialize logging")?;
    debug!("CLI arguments: {:?}", args);

    let server_config = ServerConfig {
        bind: args.bind.clone(),
        seed_urls: args.seed_urls(),
    };
    let config = AppConfig::from(args.service);

    let store = config.open_store().context("Failed to open document store")?;
    let embedder = config.embedder().context("Failed to create embedding provider")?;
    let source = config.paper_source().context("Failed to create paper source")?;
    let answerer = config.answerer().context("Failed to create answer provider")?;
    info!(
        embedding_model = embedder.model_name(),
        answer_model = answerer.model_name(),
        "Providers ready"
    );

    let pipeline = IngestionPipeline::connect(embedder.clone(), store.clone(), source)
        .await
        .context("Failed to connect ingestion pipeline")?;
    let engine = QueryEngine::new(embedder, store.clone(), answerer);

    server::run(server_config, AppState::new(pipeline, engine, store))
        .await
        .context("Server failed")?;
    Ok(())
}
