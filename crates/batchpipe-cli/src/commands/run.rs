//! `batchpipe run` command implementation
//!
//! Submits one table and blocks until its results are downloaded. Several
//! tables fall back to asynchronous submission.

use super::report;
use crate::config::Config;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::orchestrator::{self, RunOptions};
use crate::progress;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

/// Run the pipeline end to end
pub async fn run(config: Config, options: RunOptions, cancel: CancellationToken) -> Result<()> {
    let ctx = PipelineContext::from_config(config, true, cancel).await?;

    println!("{} Running batch pipeline...", "→".cyan());
    let spinner = progress::create_spinner("Waiting for batch job");
    let result = orchestrator::run_sync(&ctx, &options).await;
    spinner.finish_and_clear();

    let run = result?;
    report::print_run(&run);
    run.finish()
}
