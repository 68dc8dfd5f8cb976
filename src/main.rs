//! # Study Harness CLI (`ask`)
//!
//! The `ask` binary is the primary interface for Study Harness. It provides
//! commands for database initialization, document ingestion, question
//! answering, document management, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! ask --config ./config/study.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ask init` | Create the SQLite database and run schema migrations |
//! | `ask ingest <file>` | Ingest a PDF or image into the corpus |
//! | `ask question "<text>"` | Answer a question (RAG by default) |
//! | `ask documents list` | List ingested documents |
//! | `ask documents delete <id>` | Delete a document and its chunks |
//! | `ask serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! ask init --config ./config/study.toml
//!
//! # Ingest lecture notes with an explicit subject
//! ask ingest ./calculus.pdf --subject 数学
//!
//! # Ask a grounded question restricted to one subject
//! ask question "微分の連鎖律を教えて" --subject 数学
//!
//! # Ask without retrieval
//! ask question "一般相対性理論とは" --no-rag
//!
//! # Start the HTTP API
//! ask serve --config ./config/study.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use study_harness::config;
use study_harness::embedding::Encoder;
use study_harness::llm::OllamaClient;
use study_harness::models::DocumentStatus;
use study_harness::ocr::OcrClient;
use study_harness::rag::RagService;
use study_harness::search::SqliteIndex;
use study_harness::{conversations, db, documents, ingest, migrate, server};

/// Study Harness CLI — retrieval-augmented question answering over
/// ingested course material.
#[derive(Parser)]
#[command(
    name = "ask",
    about = "Study Harness — retrieval-augmented question answering over course material",
    version,
    long_about = "Study Harness ingests lecture documents (PDFs, problem photos), embeds them \
    with the multilingual-e5 asymmetric convention, and answers academic questions by grounding \
    a language-model generation on the most similar excerpts, with source attribution."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/study.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, conversations). Idempotent.
    Init,

    /// Ingest a document into the corpus.
    ///
    /// Extracts text (PDF in-process, images via the OCR service), chunks
    /// it, embeds every chunk as a passage, and stores the batch
    /// atomically. Without --subject the material is auto-classified.
    Ingest {
        /// Path to a .pdf, .png, .jpg, or .jpeg file.
        file: PathBuf,

        /// Subject tag (e.g. 数学). Auto-classified when omitted.
        #[arg(long)]
        subject: Option<String>,
    },

    /// Answer a question.
    Question {
        /// The question text.
        text: String,

        /// Skip retrieval and answer from model knowledge alone.
        #[arg(long)]
        no_rag: bool,

        /// Restrict retrieval to documents with this subject tag.
        #[arg(long)]
        subject: Option<String>,

        /// Conversation session id (generated when omitted).
        #[arg(long)]
        session: Option<String>,
    },

    /// Manage ingested documents.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },

    /// Start the HTTP API server.
    Serve,
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// List documents with optional filters.
    List {
        /// Filter by status: processing, completed, or failed.
        #[arg(long)]
        status: Option<String>,

        /// Filter by subject tag.
        #[arg(long)]
        subject: Option<String>,

        /// Maximum number of rows.
        #[arg(long, default_value_t = 50)]
        limit: i64,

        /// Pagination offset.
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Delete a document and all of its chunks.
    Delete {
        /// Document UUID.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, subject } => {
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("invalid file path: {}", file.display()))?
                .to_string();
            let bytes = std::fs::read(&file)?;

            let pool = db::connect(&cfg).await?;
            migrate::apply_schema(&pool).await?;

            let encoder = Encoder::new(&cfg.embedding)?;
            let llm = OllamaClient::new(&cfg.llm)?;
            let ocr = OcrClient::new(&cfg.ocr)?;

            let report = ingest::ingest_file(
                &pool,
                &cfg,
                &encoder,
                &ocr,
                &llm,
                &filename,
                bytes,
                subject.as_deref(),
            )
            .await?;

            println!("ingest {}", filename);
            println!("  document id: {}", report.document_id);
            println!("  chunks written: {}", report.chunks_written);
            if let Some(subject) = report.subject {
                println!("  subject: {}", subject);
            }
            println!("ok");
            pool.close().await;
        }
        Commands::Question {
            text,
            no_rag,
            subject,
            session,
        } => {
            let pool = db::connect(&cfg).await?;

            let encoder = Arc::new(Encoder::new(&cfg.embedding)?);
            let index = Arc::new(SqliteIndex::new(pool.clone()));
            let llm = Arc::new(OllamaClient::new(&cfg.llm)?);
            let rag = RagService::new(
                encoder,
                index,
                llm,
                cfg.retrieval.top_k,
                cfg.llm.temperature,
            );

            let use_rag = !no_rag;
            let (answer, references) = rag.answer(&text, use_rag, subject.as_deref()).await?;

            let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let referenced_ids: Vec<String> =
                references.iter().map(|r| r.document_id.clone()).collect();
            conversations::append(
                &pool,
                &session_id,
                &text,
                &answer,
                use_rag,
                false,
                &referenced_ids,
            )
            .await?;

            println!("{}", answer);
            if !references.is_empty() {
                println!();
                println!("references:");
                for (i, r) in references.iter().enumerate() {
                    let subject = r
                        .subject
                        .as_deref()
                        .map(|s| format!("（{}）", s))
                        .unwrap_or_default();
                    println!("  {}. {}{}", i + 1, r.filename, subject);
                }
            }
            pool.close().await;
        }
        Commands::Documents { action } => match action {
            DocumentsAction::List {
                status,
                subject,
                limit,
                offset,
            } => {
                let status = match status.as_deref() {
                    Some(s) => Some(DocumentStatus::parse(s).ok_or_else(|| {
                        anyhow::anyhow!(
                            "invalid status: '{}'. Use processing, completed, or failed.",
                            s
                        )
                    })?),
                    None => None,
                };

                let pool = db::connect(&cfg).await?;
                let filters = documents::DocumentFilters { status, subject };
                let listings = documents::list_documents(&pool, &filters, limit, offset).await?;
                let total = documents::count_documents(&pool, &filters).await?;

                for l in &listings {
                    let subject = l.document.subject.as_deref().unwrap_or("-");
                    println!(
                        "{}  [{}]  {}  subject: {}  chunks: {}",
                        l.document.id,
                        l.document.status.as_str(),
                        l.document.filename,
                        subject,
                        l.chunk_count
                    );
                    if let Some(ref err) = l.document.error_message {
                        println!("    error: {}", err);
                    }
                }
                println!("total: {}", total);
                pool.close().await;
            }
            DocumentsAction::Delete { id } => {
                let pool = db::connect(&cfg).await?;
                if documents::delete_document(&pool, &id).await? {
                    println!("Document {} deleted.", id);
                } else {
                    anyhow::bail!("Document {} not found", id);
                }
                pool.close().await;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
