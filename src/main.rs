//! # assis CLI
//!
//! ## Usage
//!
//! ```bash
//! assis --config ~/.assis/assis.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `assis ask <question...>` | Answer a question from indexed context |
//! | `assis index [source]` | Index config, manpage, home or all sources |
//! | `assis list` | Print every indexed record |
//! | `assis sources` | Show configured sources and store status |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use assis::config;
use assis::index::IndexSelection;
use assis::models::Category;
use assis::progress::ProgressMode;

/// assis: a local-first assistant for Linux system files, manual pages
/// and home-directory documents.
#[derive(Parser)]
#[command(
    name = "assis",
    about = "assis: a local-first retrieval-augmented assistant for Linux",
    version
)]
struct Cli {
    /// Path to the TOML configuration file (default: ~/.assis/assis.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging. `RUST_LOG` takes precedence.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Index progress on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question. Retrieved context and an optional file are sent to the model.
    Ask {
        /// The question, as free text.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Include this file's contents in the context.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Only retrieve records of this source type.
        #[arg(long = "type", value_enum)]
        category: Option<Category>,
    },

    /// Index sources into the vector store.
    Index {
        #[arg(value_enum, default_value = "all")]
        source: IndexSelection,
    },

    /// Print every indexed record.
    List {
        #[arg(long = "type", value_enum)]
        category: Option<Category>,
    },

    /// Show configured sources and vector store status.
    Sources,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "assis=debug" } else { "assis=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let cfg = config::load_config(&config_path)?;

    match cli.command {
        Commands::Ask {
            query,
            file,
            category,
        } => {
            assis::answer::run_ask(&cfg, &query, file.as_deref(), category).await?;
        }
        Commands::Index { source } => {
            let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
            assis::index::run_index(&cfg, source, progress).await?;
        }
        Commands::List { category } => {
            assis::list::run_list(&cfg, category).await?;
        }
        Commands::Sources => {
            assis::sources::list_sources(&cfg).await?;
        }
    }

    Ok(())
}
