//! # parcelflow - Parcellation Statistics Pipeline
//!
//! The main binary of parcelflow.
//!
//! This application provides:
//! - CLI interface over the pipeline engine
//! - TOML configuration of the dataset, executor and schemes
//! - Ctrl-C cancellation of in-flight runs
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                apps/parcelflow (THE BINARY)              │
//! │                                                          │
//! │   ┌─────────────┐   ┌──────────────┐   ┌─────────────┐   │
//! │   │    CLI      │   │    Config    │   │   Signals   │   │
//! │   │   (clap)    │   │    (toml)    │   │   (tokio)   │   │
//! │   └──────┬──────┘   └──────┬───────┘   └──────┬──────┘   │
//! │          └─────────────────┼──────────────────┘          │
//! │                            ▼                             │
//! │                   ┌─────────────────┐                    │
//! │                   │ parcelflow-core │                    │
//! │                   │ (THE PIPELINE)  │                    │
//! │                   └─────────────────┘                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Inspect the dataset
//! parcelflow --base-dir /data/derivatives/freesurfer subjects
//!
//! # Run everything for two subjects, four at a time
//! parcelflow -c parcelflow.toml run -s schemeX -p 01 -p 02 -j 4 -o table.csv
//! ```

use clap::Parser;
use parcelflow::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // PARCELFLOW_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("PARCELFLOW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "parcelflow=info,parcelflow_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
