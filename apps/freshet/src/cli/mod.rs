//! # Freshet CLI Module
//!
//! This module implements the CLI interface for Freshet.
//!
//! ## Available Commands
//!
//! - `run` - Run every cell of a script in notebook order
//! - `check` - Parse a script and report static problems
//! - `slice` - Run a script, then print the slice for a symbol
//! - `export` - Run a script and write the session snapshot to a file
//! - `serve` - Start the HTTP server

mod commands;

use crate::host::HostError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Freshet - Notebook Dataflow Engine
///
/// Tracks what every statement read and wrote, knows which cells are
/// stale, and can slice a notebook down to the statements one value needs.
#[derive(Parser, Debug)]
#[command(name = "freshet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Path to a TOML config file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every cell of a script in notebook order
    Run {
        /// Path to the script
        script: PathBuf,

        /// Re-run offer policy (liveness, dag, hybrid, strict)
        #[arg(short, long)]
        schedule: Option<String>,

        /// Dataflow direction (any_order, in_order)
        #[arg(short = 'F', long)]
        flow_order: Option<String>,
    },

    /// Parse a script and report static problems without running it
    Check {
        /// Path to the script
        script: PathBuf,
    },

    /// Run a script, then print the slice for a symbol
    Slice {
        /// Path to the script
        script: PathBuf,

        /// Symbol to slice from
        #[arg(short, long)]
        symbol: String,

        /// Slice forward (consumers) instead of backward (producers)
        #[arg(short, long)]
        forward: bool,

        /// Pin the slice to `EXEC:STMT` instead of the latest write
        #[arg(long)]
        at: Option<String>,

        /// Edge context (prefer_dynamic, dynamic_only, static_only)
        #[arg(short, long)]
        policy: Option<String>,
    },

    /// Run a script and write the session snapshot to a file
    Export {
        /// Path to the script
        script: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), HostError> {
    let json_mode = cli.json_mode;
    let config = load_app_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            script,
            schedule,
            flow_order,
        } => cmd_run(
            &config,
            json_mode,
            &script,
            schedule.as_deref(),
            flow_order.as_deref(),
        ),
        Commands::Check { script } => cmd_check(json_mode, &script),
        Commands::Slice {
            script,
            symbol,
            forward,
            at,
            policy,
        } => cmd_slice(
            &config,
            json_mode,
            &script,
            &symbol,
            forward,
            at.as_deref(),
            policy.as_deref(),
        ),
        Commands::Export { script, output } => cmd_export(&config, &script, &output),
        Commands::Serve { host, port } => cmd_serve(&config, host, port).await,
    }
}
