//! Polystore CLI - inspect schemas and manage storage from the shell.
//!
//! Loads the layered configuration, sets up logging from it, and runs one
//! subcommand against the configured storage engine.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod config_bridge;
mod theme;

use commands::{config, entities, ping, schema, sync};

/// Polystore - one entity model over `MongoDB` or `PostgreSQL`
#[derive(Parser)]
#[command(name = "polystore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a configuration file
    #[arg(short, long, global = true, env = "POLYSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the compiled schema of an entity
    Schema {
        /// Entity name (case-insensitive)
        entity: String,

        /// Compilation target
        #[arg(short, long, value_enum, default_value_t = Target::Relational)]
        target: Target,
    },

    /// List registered entities
    Entities,

    /// Connect to the configured engine and report its state
    Ping,

    /// Create missing tables or collections and their indexes
    Sync {
        /// Entities to sync (default: all)
        entities: Vec<String>,
    },

    /// Show the resolved configuration
    Config,
}

/// Schema compilation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Target {
    /// PostgreSQL DDL
    Relational,
    /// MongoDB `$jsonSchema` validator
    Document,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace_root = std::env::current_dir().ok();
    let resolved = polystore_config::load(cli.config.as_deref(), workspace_root.as_deref())
        .context("failed to load configuration")?;

    // Set up logging from config, with --verbose override.
    let mut log_config = config_bridge::to_log_config(&resolved.config);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = polystore_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Schema { entity, target } => schema::show_schema(&entity, target)?,
        Commands::Entities => entities::list_entities()?,
        Commands::Ping => ping::ping(&resolved.config.database).await?,
        Commands::Sync { entities } => sync::sync(&resolved.config.database, &entities).await?,
        Commands::Config => config::show_config(&resolved)?,
    }

    Ok(())
}
