//! # Lectern CLI
//!
//! The `lectern` binary answers questions about ingested course materials.
//!
//! ## Usage
//!
//! ```bash
//! lectern --config ./config/lectern.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lectern init` | Create the SQLite database and run schema migrations |
//! | `lectern ingest <path>` | Ingest a course document or folder of documents |
//! | `lectern ask "<query>"` | Answer one question (requires `ANTHROPIC_API_KEY`) |
//! | `lectern courses` | Show catalog analytics |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! lectern init
//!
//! # Load a folder of course documents
//! lectern ingest ./docs
//!
//! # Ask a question, continuing an earlier session
//! lectern ask "What is covered in Lesson 0?" --session 7e2a...
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use lectern::config;
use lectern::ingest;
use lectern::llm::AnthropicClient;
use lectern::migrate;
use lectern::orchestrator::Orchestrator;
use lectern::store::RetrievalStore;

/// Lectern — retrieval-augmented question answering over course materials.
#[derive(Parser)]
#[command(
    name = "lectern",
    about = "Lectern — retrieval-augmented question answering over course materials",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lectern.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (courses,
    /// chunks, chunk_vectors). Idempotent.
    Init,

    /// Ingest a course document or a folder of documents.
    ///
    /// Parses each document's header and lesson blocks, chunks the lesson
    /// text, embeds the chunks, and stores everything. Documents whose
    /// course title is already in the catalog are skipped; malformed
    /// documents fail individually without aborting the batch.
    Ingest {
        /// A course document (`.txt`) or a folder containing them.
        path: PathBuf,

        /// Wipe all existing courses and chunks before ingesting.
        #[arg(long)]
        clear: bool,
    },

    /// Ask a question about the ingested course materials.
    ///
    /// Runs the two-phase tool protocol against the configured model and
    /// prints the answer with its sources. Requires the `ANTHROPIC_API_KEY`
    /// environment variable.
    Ask {
        /// The question to answer.
        query: String,

        /// Session id from a previous `ask`, to continue the conversation.
        #[arg(long)]
        session: Option<String>,
    },

    /// Show catalog analytics: course count and titles.
    Courses,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Missing config file is fine: defaults cover every setting.
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        config::Config::minimal()
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, clear } => {
            let store = RetrievalStore::open(&cfg).await?;
            ingest::run_ingest(&cfg, &store, &path, clear).await?;
        }
        Commands::Ask { query, session } => {
            let store = Arc::new(RetrievalStore::open(&cfg).await?);
            let model = Box::new(AnthropicClient::from_config(&cfg.model)?);
            let orchestrator = Orchestrator::new(&cfg, store, model);

            let response = orchestrator.query(&query, session.as_deref()).await?;

            println!("{}", response.answer);
            if !response.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &response.sources {
                    match &source.link {
                        Some(link) => println!("  - {} ({})", source.display_text, link),
                        None => println!("  - {}", source.display_text),
                    }
                }
            }
            println!();
            println!("session: {}", response.session_id);
        }
        Commands::Courses => {
            let store = RetrievalStore::open(&cfg).await?;
            let analytics = store.analytics().await?;

            println!("total courses: {}", analytics.total_courses);
            for title in analytics.course_titles {
                println!("  - {}", title);
            }
        }
    }

    Ok(())
}
