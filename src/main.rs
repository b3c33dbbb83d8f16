mod analyzer;
mod cli;
mod config;
mod db;
mod error;
mod memory;
mod queue;
mod sink;
mod worker;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "prospect",
    version,
    about = "Product-research agent with a durable task queue and tiered memory"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the analysis worker
    Serve,
    /// Submit a research query (keyword or investment range)
    Submit { query: String },
    /// Show a task's status and result
    Status { task_id: i64 },
    /// Show the long-term analysis history for a query
    History {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Cancel a task that is still waiting in the queue
    Abandon { task_id: i64 },
    /// Show queue statistics
    Stats,
    /// Run database diagnostics, including stuck-task detection
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::ProspectConfig::load()?;

    // Initialize tracing with the configured log level, to stderr so stdout
    // stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => cli::serve(config).await?,
        Command::Submit { query } => cli::submit(&config, &query)?,
        Command::Status { task_id } => cli::status(&config, task_id)?,
        Command::History { query, limit } => cli::history(&config, &query, limit)?,
        Command::Abandon { task_id } => cli::abandon(&config, task_id)?,
        Command::Stats => cli::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
