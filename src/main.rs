//! # Narrative Chunker CLI (`nchunk`)
//!
//! ## Usage
//!
//! ```bash
//! nchunk --config ./config/nchunk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nchunk init` | Create the SQLite database and provenance tables |
//! | `nchunk split <file>` | Split a text file into budgeted chunks |
//! | `nchunk transform <file>` | Split, transform each chunk via the LLM, recombine |
//! | `nchunk recombine <results.json>` | Recombine saved chunk results |
//! | `nchunk summarize <file>` | Build and store a summary hierarchy |
//! | `nchunk lineage <chunk-id>` | Show a stored node with ancestors and children |
//! | `nchunk serve` | Start the HTTP server |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use narrative_chunker::{commands, config, migrate, server};
use narrative_chunker_core::models::TransformParams;

/// Narrative Chunker: context-aware chunking, bounded LLM transformation
/// and hierarchical summarization with provenance.
#[derive(Parser)]
#[command(
    name = "nchunk",
    about = "Context-aware chunking, transformation and hierarchical summarization",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/nchunk.toml`. `split` and `recombine` fall back
    /// to built-in defaults when the file is missing.
    #[arg(long, global = true, default_value = "./config/nchunk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Split a text file into chunks that fit the token budget.
    Split {
        file: PathBuf,

        /// Override `chunking.safe_token_budget`.
        #[arg(long)]
        budget: Option<usize>,

        /// Run id used as the chunk id prefix (random UUID by default).
        #[arg(long)]
        run_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Transform a text file chunk by chunk and recombine the results.
    Transform {
        file: PathBuf,

        #[arg(long, default_value = "")]
        persona: String,

        #[arg(long, default_value = "")]
        namespace: String,

        #[arg(long, default_value = "")]
        style: String,

        #[arg(long)]
        json: bool,
    },

    /// Recombine a JSON array of chunk results.
    Recombine {
        results: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Summarize a text file into a stored multi-level hierarchy.
    Summarize {
        file: PathBuf,

        /// Run id for the stored nodes (random UUID by default).
        #[arg(long)]
        run_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show a stored node with its ancestors and children.
    Lineage {
        chunk_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require a config file
    let needs_config = !matches!(
        cli.command,
        Commands::Split { .. } | Commands::Recombine { .. }
    );
    let cfg = if needs_config {
        config::load_config(&cli.config)?
    } else if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        config::Config::minimal()
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Split {
            file,
            budget,
            run_id,
            json,
        } => {
            commands::run_split(&cfg, &file, budget, run_id, json).await?;
        }
        Commands::Transform {
            file,
            persona,
            namespace,
            style,
            json,
        } => {
            let params = TransformParams::new(&persona, &namespace, &style);
            commands::run_transform(&cfg, &file, &params, json).await?;
        }
        Commands::Recombine { results, json } => {
            commands::run_recombine(&cfg, &results, json).await?;
        }
        Commands::Summarize { file, run_id, json } => {
            commands::run_summarize(&cfg, &file, run_id, json).await?;
        }
        Commands::Lineage { chunk_id, json } => {
            commands::run_lineage(&cfg, &chunk_id, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
