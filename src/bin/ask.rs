//! Question-answering binary entry point.
//!
//! Answers questions against a collection built with `ingest`, showing the
//! best-matching papers alongside the generated answer. Supports single
//! questions and an interactive REPL, with table or JSON output.
//!
//! # Examples
//!
//! ```bash
//! ask --db-path papers.db --query "What does BRCA1 regulate?"
//! ask --db-path papers.db --query "BRCA1" --no-answer --format json
//! ask --db-path papers.db --interactive
//! ```

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use pubmed_rag::{
    answer::{AnswerError, AnswerProvider, AnswerResult},
    config::{AppConfig, ServiceArgs},
    models::{QueryAnswer, RetrievedDocument},
    query::QueryEngine,
    telemetry::init_logging,
    DocumentStore, EmbeddingProvider,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Serialize;
use tracing::{debug, error, info};

type Engine = QueryEngine<dyn EmbeddingProvider, dyn DocumentStore, dyn AnswerProvider>;

/// Output format for results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Ask questions against a PubMed collection
#[derive(Parser, Debug)]
#[command(
    name = "ask",
    version,
    about = "Answer questions from stored PubMed abstracts",
    long_about = "Embed a question, rank the stored abstracts by cosine similarity and ask the \
                  generative model to answer from the best match.

EXAMPLES:
  Single question:
    ask --db-path papers.db --query \"What does BRCA1 regulate?\"

  Retrieval only, as JSON:
    ask --db-path papers.db --query \"BRCA1\" --no-answer --format json

  Interactive mode:
    ask --db-path papers.db --interactive"
)]
struct AskArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// Question (required unless --interactive)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive", required_unless_present = "interactive")]
    query: Option<String>,

    /// Number of matching papers to show
    #[arg(long, value_name = "N", default_value_t = 3)]
    top_k: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Only rank documents, do not call the generative model
    #[arg(long)]
    no_answer: bool,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,
}

/// Stands in for the generative model when answers are disabled.
struct RetrievalOnly;

#[async_trait]
impl AnswerProvider for RetrievalOnly {
    async fn generate_answer(&self, _question: &str, _context: &str) -> AnswerResult<String> {
        Err(AnswerError::ConfigError("answer generation is disabled".to_string()))
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

#[derive(Debug, Serialize)]
struct AskOutput {
    question: String,
    answer: Option<QueryAnswer>,
    matches: Vec<RetrievedDocument>,
}

struct Session {
    engine: Engine,
    top_k: usize,
    format: OutputFormat,
    with_answer: bool,
    answer_available: bool,
}

impl Session {
    async fn ask(&self, question: &str) -> Result<AskOutput> {
        debug!("Asking: {}", question);
        let (answer, matches) = if self.with_answer {
            let (answer, matches) = self
                .engine
                .answer_with_matches(question, self.top_k)
                .await
                .with_context(|| format!("Failed to answer '{}'", question))?;
            (Some(answer), matches)
        } else {
            let matches = self
                .engine
                .retrieve(question, self.top_k)
                .await
                .with_context(|| format!("Failed to rank documents for '{}'", question))?;
            (None, matches)
        };

        Ok(AskOutput {
            question: question.to_string(),
            answer,
            matches,
        })
    }

    /// Turn answering on or off; it can only be turned on when a generative
    /// model was configured at startup.
    fn set_answering(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.answer_available {
            anyhow::bail!("answer generation was disabled with --no-answer; restart without it");
        }
        self.with_answer = enabled;
        Ok(())
    }

    fn print(&self, output: &AskOutput, elapsed_secs: f64) -> Result<()> {
        match self.format {
            OutputFormat::Table => {
                if let Some(answer) = &output.answer {
                    println!("\n{}\n", answer.answer);
                    println!("Source: {} (score {:.4})\n", answer.url, answer.score);
                }
                println!("{}", format_matches_table(&output.matches));
                println!("\nRanked {} documents in {:.2}s", output.matches.len(), elapsed_secs);
            }
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(output).context("Failed to serialize output to JSON")?;
                println!("{}", json);
            }
        }
        Ok(())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn format_matches_table(matches: &[RetrievedDocument]) -> String {
    if matches.is_empty() {
        return "No documents found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("PMID").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for doc in matches {
        let title = doc.metadata.get("title").map(String::as_str).unwrap_or("");
        let year = doc
            .metadata
            .get("publication_year")
            .map(String::as_str)
            .unwrap_or("");
        let color = if doc.rank == 1 { Color::Green } else { Color::White };

        table.add_row(vec![
            Cell::new(doc.rank),
            Cell::new(&doc.id),
            Cell::new(truncate(title, 60)),
            Cell::new(year),
            Cell::new(format!("{:.4}", doc.score)).fg(color),
        ]);
    }

    table.to_string()
}

fn print_help() {
    println!("Commands:");
    println!("  <question>      - Ask a question");
    println!("  /top N          - Show N matching papers");
    println!("  /format table   - Use table output format");
    println!("  /format json    - Use JSON output format");
    println!("  /answer on|off  - Toggle answer generation");
    println!("  /help           - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

async fn run_interactive(mut session: Session) -> Result<()> {
    println!("Interactive PubMed Q&A");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;

    loop {
        match rl.readline("Ask> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts.as_slice() {
                        ["/help"] => print_help(),
                        ["/top", n] => match n.parse::<usize>() {
                            Ok(n) if n > 0 => {
                                session.top_k = n;
                                println!("Set top-k to {}", n);
                            }
                            _ => eprintln!("Invalid number: must be a positive integer"),
                        },
                        ["/format", "table"] => {
                            session.format = OutputFormat::Table;
                            println!("Set output format to table");
                        }
                        ["/format", "json"] => {
                            session.format = OutputFormat::Json;
                            println!("Set output format to JSON");
                        }
                        ["/answer", "on"] => match session.set_answering(true) {
                            Ok(()) => println!("Answer generation enabled"),
                            Err(e) => eprintln!("{}", e),
                        },
                        ["/answer", "off"] => {
                            session.with_answer = false;
                            println!("Answer generation disabled");
                        }
                        _ => eprintln!("Unknown command: {}. Type /help for available commands.", line),
                    }
                    continue;
                }

                let start = Instant::now();
                match session.ask(line).await {
                    Ok(output) => {
                        if let Err(e) = session.print(&output, start.elapsed().as_secs_f64()) {
                            eprintln!("Error printing output: {}", e);
                        }
                    }
                    Err(e) => eprintln!("Query failed: {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = AskArgs::parse();
    init_logging(&args.service.log_level).context("Failed to initialize logging")?;
    debug!("CLI arguments: {:?}", args);

    if args.service.db_path.is_none() {
        anyhow::bail!("ask reads a stored collection; pass --db-path (or set DB_PATH)");
    }
    let config = AppConfig::from(args.service.clone());

    let store = config.open_store().context("Failed to open document store")?;
    let stored = store.count().await.context("Failed to count documents")?;
    info!("Collection '{}' holds {} documents", store.collection_name(), stored);

    let embedder = config.embedder().context("Failed to create embedding provider")?;
    if let Some(stored_config) = store.get_config().await.context("Failed to read embedding config")? {
        if stored_config != embedder.config() {
            anyhow::bail!(
                "Embedding model mismatch: collection was built with {} ({} dims), but {} ({} dims) is configured",
                stored_config.model_name,
                stored_config.dimension,
                embedder.model_name(),
                embedder.dimension()
            );
        }
    }

    let answerer: std::sync::Arc<dyn AnswerProvider> = if args.no_answer {
        std::sync::Arc::new(RetrievalOnly)
    } else {
        config.answerer().context("Failed to create answer provider")?
    };

    let session = Session {
        engine: QueryEngine::new(embedder, store, answerer),
        top_k: args.top_k.max(1),
        format: args.format,
        with_answer: !args.no_answer,
        answer_available: !args.no_answer,
    };

    if args.interactive {
        return run_interactive(session).await;
    }

    let Some(question) = args.query.as_deref() else {
        anyhow::bail!("--query is required unless --interactive is set");
    };
    let start = Instant::now();
    let output = session.ask(question).await?;
    session.print(&output, start.elapsed().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubmed_rag::embedding::{EmbeddingError, EmbeddingResult};
    use pubmed_rag::storage::memory::InMemoryStore;
    use std::sync::Arc;

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if text.is_empty() {
                return Err(EmbeddingError::InvalidInput("empty".to_string()));
            }
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "unit"
        }
    }

    fn retrieval_session() -> Session {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(UnitEmbedder);
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new("test"));
        let answerer: Arc<dyn AnswerProvider> = Arc::new(RetrievalOnly);
        Session {
            engine: QueryEngine::new(embedder, store, answerer),
            top_k: 3,
            format: OutputFormat::Table,
            with_answer: false,
            answer_available: false,
        }
    }

    #[test]
    fn test_answering_cannot_be_enabled_without_model() {
        let mut session = retrieval_session();

        assert!(session.set_answering(true).is_err());
        assert!(!session.with_answer);
        assert!(session.set_answering(false).is_ok());
    }

    #[test]
    fn test_answering_toggles_when_available() {
        let mut session = retrieval_session();
        session.answer_available = true;

        session.set_answering(true).unwrap();
        assert!(session.with_answer);
        session.set_answering(false).unwrap();
        assert!(!session.with_answer);
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("αβγδεζηθικ", 6), "αβγ...");
    }
}
