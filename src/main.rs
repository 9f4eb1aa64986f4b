//! # Ticket Triage CLI (`triage`)
//!
//! The `triage` binary is the primary interface for Ticket Triage. It
//! provides commands for database initialization, knowledge ingestion,
//! similarity search, grounded diagnosis, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! triage --config ./config/triage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `triage init` | Create the SQLite database and collection schemas |
//! | `triage ingest tickets <file>` | Embed and store a tickets JSON file |
//! | `triage ingest team <file>` | Embed and store a team-members JSON file |
//! | `triage diagnose "<issue>"` | Produce a grounded diagnosis for a new issue |
//! | `triage search "<query>"` | Similarity-search past tickets |
//! | `triage team "<query>"` | Similarity-search team-member profiles |
//! | `triage ask "<question>"` | One assistant turn with ticket-search capability |
//! | `triage serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! triage init --config ./config/triage.toml
//!
//! # Load the knowledge base
//! triage ingest tickets kb/tickets.json
//! triage ingest team kb/teamdata.json
//!
//! # Diagnose a fresh issue against past cases
//! triage diagnose "Machine displaying intermittent E-Stop errors"
//!
//! # Start the HTTP API
//! triage serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ticket_triage::{assist, config, ingest, migrate, rag, search, server};

/// Ticket Triage — a retrieval-augmented diagnosis assistant for
/// equipment-repair support tickets.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/triage.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "triage",
    about = "Ticket Triage — a retrieval-augmented diagnosis assistant for support tickets",
    version,
    long_about = "Ticket Triage embeds historical equipment-repair tickets and team-member \
    skill profiles into vectors, stores them in SQLite-backed collections with an IVF \
    similarity index, and grounds completion-API responses in the nearest past cases."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/triage.toml`. Database, embedding, completion,
    /// retrieval, and server settings are read from this file; the API key
    /// comes from the `OPENAI_API_KEY` environment variable.
    #[arg(long, global = true, default_value = "./config/triage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the collection tables
    /// (tickets, team_knowledge, feedback). Idempotent — running it
    /// multiple times is safe.
    Init,

    /// Ingest knowledge-base JSON files.
    ///
    /// Normalizes records into the canonical schema, generates one
    /// embedding per record via the configured embedding service, and
    /// inserts in fixed-size batches.
    Ingest {
        #[command(subcommand)]
        target: IngestTarget,
    },

    /// Produce a grounded diagnosis for a new issue.
    ///
    /// Embeds the issue text, retrieves the nearest past tickets, and asks
    /// the completion service for a structured diagnosis with a summary,
    /// suggested fix, confidence, and source case.
    Diagnose {
        /// Free-text description of the new issue.
        issue: String,

        /// Number of similar tickets to retrieve (defaults to retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Similarity-search past tickets.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Similarity-search team-member profiles.
    Team {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Ask the assistant a free-form question.
    ///
    /// Runs one assistant turn; the completion service may request the
    /// search_tickets capability, which is serviced by local retrieval.
    Ask {
        /// The question to ask.
        question: String,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` and serves the v1 endpoints (diagnose,
    /// kb/upload, kb/search, kb/search/team, feedback).
    Serve,
}

/// Ingestion subcommands.
#[derive(Subcommand)]
enum IngestTarget {
    /// Ingest a tickets JSON file (array or {"tickets": [...]}).
    Tickets {
        /// Path to the JSON file.
        file: PathBuf,
    },
    /// Ingest a team-members JSON file.
    Team {
        /// Path to the JSON file.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.log_level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { target } => match target {
            IngestTarget::Tickets { file } => {
                ingest::run_ingest_tickets(&cfg, &file).await?;
            }
            IngestTarget::Team { file } => {
                ingest::run_ingest_team(&cfg, &file).await?;
            }
        },
        Commands::Diagnose { issue, k } => {
            rag::run_diagnose(&cfg, &issue, k).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Team { query, k } => {
            search::run_team_search(&cfg, &query, k).await?;
        }
        Commands::Ask { question } => {
            assist::run_ask(&cfg, &question).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ticket_triage={level},triage={level}")));

    fmt().with_env_filter(filter).with_target(false).init();
}
