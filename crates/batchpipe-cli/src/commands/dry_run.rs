//! `batchpipe dry-run` command implementation
//!
//! Fetches and packages like `run`, writes the artifact to the dry-run
//! directory, and stops. No API key is needed and no state changes.

use super::report;
use crate::config::Config;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::orchestrator::{self, RunOptions};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

pub async fn run(config: Config, options: RunOptions, cancel: CancellationToken) -> Result<()> {
    let dir = config.dry_run_artifact_dir();
    let ctx = PipelineContext::from_config(config, false, cancel).await?;

    let run = orchestrator::dry_run(&ctx, &options).await?;
    report::print_run(&run);
    println!("{} Dry run complete; artifacts in {}", "✓".green(), dir.display());
    run.finish()
}
