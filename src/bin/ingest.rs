//! Ingestion binary entry point.
//!
//! Fetches PubMed papers by URL, embeds their abstracts and stores them in a
//! SQLite collection that the server and `ask` can query later.
//!
//! # Examples
//!
//! ```bash
//! ingest --db-path papers.db https://pubmed.ncbi.nlm.nih.gov/15858239/
//! ingest --db-path papers.db --input urls.txt
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pubmed_rag::{
    config::{AppConfig, ServiceArgs},
    ingestion::{IngestionPipeline, IngestionStats},
    telemetry::init_logging,
    DocumentStore, PaperSource,
};
use tracing::{debug, info, warn};

/// Ingestion CLI for building and updating a PubMed collection
#[derive(Parser, Debug)]
#[command(
    name = "ingest",
    version,
    about = "Fetch, embed and store PubMed papers",
    long_about = "Fetch PubMed papers by URL, embed their abstracts and store them in a collection.

EXAMPLES:
  Ingest two papers:
    ingest --db-path papers.db https://pubmed.ncbi.nlm.nih.gov/15858239/ https://pubmed.ncbi.nlm.nih.gov/6650562/

  Ingest a list of URLs, one per line:
    ingest --db-path papers.db --input urls.txt"
)]
struct IngestArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// PubMed article URLs
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// File with one PubMed URL per line (`#` starts a comment)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,
}

/// Parse a URL list, skipping blank lines and comments.
fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers | Inserted: {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = IngestArgs::parse();
    init_logging(&args.service.log_level).context("Failed to initialize logging")?;
    debug!("CLI arguments: {:?}", args);

    let start_time = Instant::now();

    let mut urls = args.urls.clone();
    if let Some(input) = &args.input {
        let contents = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read URL list {:?}", input))?;
        urls.extend(parse_url_list(&contents));
    }
    if urls.is_empty() {
        anyhow::bail!("No URLs given; pass them as arguments or with --input");
    }

    if args.service.db_path.is_none() {
        warn!("No --db-path given; documents will be discarded when the process exits");
    }
    let config = AppConfig::from(args.service);

    let store = config.open_store().context("Failed to open document store")?;
    let embedder = config.embedder().context("Failed to create embedding provider")?;
    let source = config.paper_source().context("Failed to create paper source")?;
    info!("Ingesting {} URLs from {}", urls.len(), source.name());

    let pipeline = IngestionPipeline::connect(embedder, store.clone(), source)
        .await
        .context("Failed to connect ingestion pipeline")?;

    let progress = create_progress_bar(urls.len())?;
    progress.set_message("0");

    let mut stats = IngestionStats::new();
    for url in &urls {
        let run = pipeline
            .ingest(std::slice::from_ref(url))
            .await
            .with_context(|| format!("Failed to ingest {}", url))?;
        stats.merge(&run);
        progress.inc(1);
        progress.set_message(stats.inserted.to_string());
    }
    progress.finish_with_message(stats.inserted.to_string());

    let stored = store.count().await.context("Failed to count documents")?;
    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingestion Completed               ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Total processed:      {:>16} ║", stats.total_processed);
    println!("║ Inserted:             {:>16} ║", stats.inserted);
    println!("║ Duplicates skipped:   {:>16} ║", stats.duplicates_skipped);
    println!("║ Failed:               {:>16} ║", stats.failed);
    println!("║ Documents stored:     {:>16} ║", stored);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    if stats.failed > 0 {
        warn!("{} URLs failed to ingest - check logs for details", stats.failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_list() {
        let contents = "\n# seed papers\nhttps://pubmed.ncbi.nlm.nih.gov/1/\n   \n  https://pubmed.ncbi.nlm.nih.gov/2/  \n";
        assert_eq!(
            parse_url_list(contents),
            vec![
                "https://pubmed.ncbi.nlm.nih.gov/1/",
                "https://pubmed.ncbi.nlm.nih.gov/2/"
            ]
        );
    }
}
