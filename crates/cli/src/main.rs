//! Ragline CLI: the main entry point.
//!
//! Commands:
//! - `serve`    Start the HTTP gateway
//! - `ask`      Answer one question and stream it to the terminal
//! - `config`   Show, locate or initialise the configuration
//! - `doctor`   Diagnose configuration and index health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ragline",
    about = "Ragline: streaming answers from your knowledge base",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a single question
    Ask {
        /// The question
        query: String,

        /// Allow general knowledge when the knowledge base is not confident
        #[arg(short, long)]
        general: bool,

        /// Print the aggregated response as JSON instead of streaming
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<commands::config_cmd::ConfigAction>,
    },

    /// Diagnose configuration and index health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ask {
            query,
            general,
            json,
        } => commands::ask::run(query, general, json).await?,
        Commands::Config { action } => commands::config_cmd::run(action).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
