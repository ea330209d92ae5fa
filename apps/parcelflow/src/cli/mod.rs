//! # parcelflow CLI Module
//!
//! This module implements the CLI interface for parcelflow.
//!
//! ## Available Commands
//!
//! - `subjects` - List discovered subjects, sessions and sources
//! - `paths` - Print the canonical stage artifacts of one source
//! - `validate` - Check a measure against a region group
//! - `run` - Run the stage cascade and export the aggregated table

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand, ValueEnum};
use parcelflow_core::{PipelineError, RegionGroup, Stage};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// parcelflow - FreeSurfer parcellation statistics pipeline
///
/// Labels regions, extracts statistics and exports measure tables for every
/// subject of a dataset, reusing whatever artifacts already exist on disk.
#[derive(Parser, Debug)]
#[command(name = "parcelflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the TOML configuration
    #[arg(short, long, global = true, env = "PARCELFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Dataset directory (overrides dataset.base_dir)
    #[arg(short, long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Serialization of the exported table.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    Csv,
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List discovered subjects, sessions and source files
    Subjects,

    /// Print canonical stage paths of a source without touching disk
    Paths {
        /// Source directory (a reconstructed subject)
        #[arg(long)]
        source: PathBuf,

        /// Parcellation scheme
        #[arg(short, long)]
        scheme: String,

        /// Region group (lh, rh, subcortex); all when omitted
        #[arg(short, long)]
        region: Option<RegionGroup>,

        /// Measure of the export; every permitted measure when omitted
        #[arg(short, long)]
        measure: Option<String>,
    },

    /// Check a measure against a region group
    Validate {
        /// Region group or category (lh, rh, subcortex, hemispheric, subcortical)
        #[arg(short, long)]
        region: String,

        /// Measure name
        #[arg(short, long)]
        measure: String,
    },

    /// Run the stage cascade over the dataset
    Run {
        /// Parcellation scheme (must be configured)
        #[arg(short, long)]
        scheme: String,

        /// Subject label (repeatable); configured participants when omitted
        #[arg(short, long = "participant")]
        participants: Vec<String>,

        /// Session label (repeatable); every session when omitted
        #[arg(long = "session")]
        sessions: Vec<String>,

        /// Region group (repeatable); all groups when omitted
        #[arg(short, long = "region")]
        regions: Vec<RegionGroup>,

        /// Measure (repeatable); each group's full set when omitted
        #[arg(short, long = "measure")]
        measures: Vec<String>,

        /// Topmost stage (labeling, statistics, export)
        #[arg(long, default_value = "export")]
        stage: Stage,

        /// Recompute artifacts that already exist
        #[arg(short, long)]
        force: bool,

        /// Subjects processed concurrently (overrides executor.jobs)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Write the table to this file instead of standard output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Table format
        #[arg(long, value_enum, default_value_t = TableFormat::Csv)]
        format: TableFormat,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI command.
pub async fn execute(cli: Cli) -> Result<(), PipelineError> {
    let config = Config::discover(cli.config.as_deref())?;
    let base_dir = cli.base_dir.as_deref();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Paths {
            source,
            scheme,
            region,
            measure,
        }) => cmd_paths(&config, &source, &scheme, region, measure.as_deref(), json_mode),
        Some(Commands::Validate { region, measure }) => cmd_validate(&region, &measure, json_mode),
        Some(Commands::Run {
            scheme,
            participants,
            sessions,
            regions,
            measures,
            stage,
            force,
            jobs,
            output,
            format,
        }) => {
            let options = RunOptions {
                scheme,
                participants,
                sessions,
                regions,
                measures,
                stage,
                force,
                jobs,
                output,
                format,
            };
            cmd_run(&config, base_dir, options, cli.verbose, json_mode).await
        }
        Some(Commands::Subjects) | None => {
            // No subcommand - list the dataset by default
            cmd_subjects(&config, base_dir, json_mode)
        }
    }
}
