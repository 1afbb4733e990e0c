//! Pipes - Query Pipes tables from the command line
//!
//! # Usage
//!
//! ```bash
//! # List available tables
//! pipes tables
//!
//! # Stream rows of a table
//! pipes query pipes_connection -w identity_handle=acme --limit 20
//! pipes query pipes_organization -w handle=acme --output compact
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Pipes - Query Pipes tables from the command line
#[derive(Parser, Debug)]
#[command(name = "pipes")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available tables and their key columns
    Tables(cmd::tables::TablesArgs),

    /// Stream the rows of one table
    Query(cmd::query::QueryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Tables(args) => {
            // Tables only prints static metadata
            cmd::tables::run(args)
        }
        Command::Query(args) => {
            init_logging(&resolve_log_level(cli.log_level.as_deref()))?;
            cmd::query::run(args, cli.config.as_deref()).await
        }
    }
}

/// Resolve log level: CLI flag > RUST_LOG > default "warn"
fn resolve_log_level(cli_level: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return level.to_string();
    }

    if let Ok(level) = std::env::var("RUST_LOG")
        && !level.is_empty()
    {
        return level;
    }

    "warn".to_string()
}

/// Initialize the tracing subscriber, writing to stderr so stdout carries only rows
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("warn"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    Ok(())
}
