//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use pulse_core::types::DataScenario;

/// Streaming metrics engine with debounced filtering.
///
/// Runs a synthetic metric feed into a bounded buffer and evaluates
/// compound filter criteria over it, printing throughput and filter
/// summaries.
#[derive(Debug, Parser)]
#[command(name = "pulse", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stream data for a while and print metrics and filter results.
    Run(RunArgs),

    /// List the available data scenarios.
    Scenarios,
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// How long to stream before printing the summary.
    #[arg(long, default_value_t = 10)]
    pub duration_secs: u64,

    /// Override the configured scenario for this run.
    #[arg(long)]
    pub scenario: Option<DataScenario>,

    /// Trigger a data spike shortly after connecting.
    #[arg(long)]
    pub spike: bool,

    /// Keep only points whose category equals this value.
    #[arg(long)]
    pub filter_category: Option<String>,
}
