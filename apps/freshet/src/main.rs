//! # Freshet - Notebook Dataflow Engine
//!
//! The main binary for the Freshet dataflow tracking engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for running, checking, and slicing scripts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  apps/freshet (THE BINARY)                  │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐  │
//! │  │    CLI      │    │  HTTP API   │    │   Script Host   │  │
//! │  │   (clap)    │    │   (axum)    │    │ (parser+interp) │  │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬────────┘  │
//! │         │                  │                    │           │
//! │         └──────────────────┼────────────────────┘           │
//! │                            ▼                                │
//! │                    ┌───────────────┐                        │
//! │                    │ freshet-core  │                        │
//! │                    │ (THE ENGINE)  │                        │
//! │                    └───────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Run a script and print freshness
//! freshet run notebook.fr
//!
//! # Slice a symbol out of a script
//! freshet slice notebook.fr --symbol result
//!
//! # Start the HTTP server
//! freshet serve --host 0.0.0.0 --port 8080
//! ```

use clap::Parser;
use freshet::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — FRESHET_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("FRESHET_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "freshet=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Freshet startup banner.
fn print_banner() {
    println!(
        r#"
  ███████╗██████╗ ███████╗███████╗██╗  ██╗███████╗████████╗
  ██╔════╝██╔══██╗██╔════╝██╔════╝██║  ██║██╔════╝╚══██╔══╝
  █████╗  ██████╔╝█████╗  ███████╗███████║█████╗     ██║
  ██╔══╝  ██╔══██╗██╔══╝  ╚════██║██╔══██║██╔══╝     ██║
  ██║     ██║  ██║███████╗███████║██║  ██║███████╗   ██║
  ╚═╝     ╚═╝  ╚═╝╚══════╝╚══════╝╚═╝  ╚═╝╚══════╝   ╚═╝

  Notebook Dataflow Engine v{}

  Deterministic • Traced • Sliceable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
