//! `batchpipe submit` command implementation
//!
//! Collects finished jobs from earlier runs, then submits every requested
//! table without waiting. Meant for cron.

use super::report;
use crate::config::Config;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::orchestrator::{self, RunOptions};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

pub async fn run(config: Config, options: RunOptions, cancel: CancellationToken) -> Result<()> {
    let ctx = PipelineContext::from_config(config, true, cancel).await?;

    let run = orchestrator::submit_async(&ctx, &options).await?;
    report::print_run(&run);

    let submitted = run.tables.iter().filter(|t| t.job.is_some()).count();
    if submitted > 0 {
        println!(
            "{} Submitted {} job(s); collect results with 'batchpipe check-outputs'",
            "✓".green(),
            submitted
        );
    }
    run.finish()
}
