//! Daisy CLI: the main entry point.
//!
//! Commands:
//! - `onboard`  Write a starter config
//! - `agent`    Interactive or single-message conversation
//! - `match`    Show which command a task would be matched to
//! - `embed`    Embed tool examples into module files
//! - `history`  Show stored conversation history

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "daisy",
    about = "Daisy: a talking personal assistant",
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
    /// Write a starter configuration
    Onboard,

    /// Talk to the assistant
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print answers without speaking them
        #[arg(long)]
        no_voice: bool,
    },

    /// Show the best and runner-up command for a task
    Match {
        /// The task to match
        task: String,
    },

    /// Embed tool example phrases into module files
    Embed {
        /// Only embed this tool
        #[arg(short, long)]
        tool: Option<String>,
    },

    /// Show stored conversation history
    History {
        /// List conversations instead of messages
        #[arg(short, long)]
        list: bool,

        /// How many recent messages to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

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
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Agent { message, no_voice } => commands::agent::run(message, no_voice).await?,
        Commands::Match { task } => commands::match_cmd::run(&task).await?,
        Commands::Embed { tool } => commands::embed::run(tool.as_deref()).await?,
        Commands::History { list, limit } => commands::history::run(list, limit).await?,
    }

    Ok(())
}
