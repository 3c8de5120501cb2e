//! batchpipe CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Moves new rows from a data source into an asynchronous batch-inference
//! job and brings the results back.
//!
//! # Overview
//!
//! - **Run**: fetch, package, submit, wait, download (`batchpipe run`)
//! - **Dry run**: package only, no API calls (`batchpipe dry-run`)
//! - **Submit**: cron-friendly fire-and-forget submission (`batchpipe submit`)
//! - **Resume**: continue polling a job by id (`batchpipe resume <job_id>`)
//! - **Check outputs**: collect results of finished jobs (`batchpipe check-outputs`)
//! - **Status**: list recorded jobs and watermarks (`batchpipe status`)
//!
//! Each table keeps a high-water-mark; it only moves after a job has been
//! created and recorded, so a failed run is retried by simply running again.

pub mod api;
pub mod clock;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod progress;
pub mod retriever;
pub mod store;
pub mod submitter;

// Re-export commonly used types
pub use context::PipelineContext;
pub use error::{BatchError, Result};
pub use job::{BatchJob, JobStatus};
pub use orchestrator::RunOptions;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// batchpipe - batch-inference job lifecycle orchestrator
#[derive(Parser, Debug)]
#[command(name = "batchpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project file (defaults to ./batchpipe.toml when present)
    #[arg(long, env = "BATCHPIPE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Inference API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Print the CLI reference as Markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit one table and wait for its results
    Run(SelectionArgs),

    /// Package records into a local artifact without submitting
    DryRun(SelectionArgs),

    /// Submit tables without waiting (collects finished jobs first)
    Submit(SelectionArgs),

    /// Continue polling a submitted job and download its results
    Resume {
        /// Batch job id, e.g. batch_6820c5a0...
        job_id: String,
    },

    /// Poll unfinished jobs once and download completed results
    CheckOutputs,

    /// Show recorded jobs and table watermarks
    Status,

    /// List model keys and batch-capable models
    Models,
}

/// Which records to process
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Table to process; repeat or comma-separate for several
    #[arg(short, long = "table", value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Window for a table's first run or a rewind, in hours (0 fetches nothing)
    #[arg(long, default_value_t = orchestrator::DEFAULT_LOOKBACK_HOURS)]
    pub hours: u32,

    /// Model key (nano, mini, full) or model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Use the lookback window instead of the watermark for this run
    #[arg(long)]
    pub rewind: bool,
}

impl From<&SelectionArgs> for RunOptions {
    fn from(args: &SelectionArgs) -> Self {
        Self {
            tables: args
                .tables
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            hours: args.hours,
            model: args.model.clone(),
            rewind: args.rewind,
        }
    }
}
