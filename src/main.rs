//! # Insurance FAQ CLI (`faq`)
//!
//! ## Usage
//!
//! ```bash
//! faq --config ./config/faq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `faq ask "<question>"` | Build the index and answer one question |
//! | `faq chunk` | Split the document and list chunks (no network calls) |
//! | `faq index` | Build the index and report its size |
//! | `faq serve` | Start the HTTP workflow trigger |
//! | `faq completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! faq ask "保费是多少?"
//! faq ask "身故赔偿如何计算?" --json
//! RUST_LOG=debug faq ask "可以提早退保吗?"
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use insurance_faq::builder::chunk_document;
use insurance_faq::config::load_config;
use insurance_faq::models::IndexOutcome;
use insurance_faq::workflow::FaqService;
use insurance_faq::{logging, server};

/// Insurance FAQ: answer questions about an insurance policy document with
/// retrieval-augmented generation.
#[derive(Parser)]
#[command(
    name = "faq",
    about = "Answer questions about an insurance policy document",
    version,
    long_about = "Loads a policy document, splits it into overlapping chunks, embeds them into an \
    in-memory index, retrieves the passages closest to a question, and asks a language model for \
    an answer grounded in those passages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/faq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about the policy.
    ///
    /// Runs the full workflow: the index is built, queried, and discarded.
    Ask {
        /// The question, e.g. "保费是多少?".
        question: String,

        /// Print the structured workflow result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Split the document and list the chunks without embedding them.
    Chunk {
        /// Print chunks as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Build the index once and report its size.
    Index,

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves `POST /workflows/insurance-faq/run`.
    Serve,

    /// Generate shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config_path = cli.config;
    let cfg = || load_config(&config_path);

    match cli.command {
        Commands::Ask { question, json } => {
            let service = FaqService::from_config(cfg()?)?;
            let result = service.ask(&question).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if let Some(answer) = &result.answer {
                println!("{}", answer);
            }
            if !result.is_success() {
                anyhow::bail!(result.error.unwrap_or_else(|| "unknown error".to_string()));
            }
        }
        Commands::Chunk { json } => {
            let chunks = chunk_document(&cfg()?).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&chunks)?);
            } else {
                for c in &chunks {
                    let preview: String = c.text.chars().take(40).collect();
                    println!(
                        "#{:<4} page {:<3} {:>4} chars{}  {}",
                        c.chunk_index,
                        c.metadata.page,
                        c.text.chars().count(),
                        if c.hard_cut { " (hard cut)" } else { "" },
                        preview.replace('\n', " ")
                    );
                }
                println!("{} chunks", chunks.len());
            }
        }
        Commands::Index => {
            let service = FaqService::from_config(cfg()?)?;
            match service.build().await {
                IndexOutcome::Ready(index) => {
                    println!(
                        "Indexed {} chunks with {} ({} dims).",
                        index.len(),
                        index.model(),
                        index.dims()
                    );
                }
                IndexOutcome::Failed(err) => return Err(err.into()),
            }
        }
        Commands::Serve => {
            let service = Arc::new(FaqService::from_config(cfg()?)?);
            server::run_server(service).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "faq", &mut std::io::stdout());
        }
    }

    Ok(())
}
