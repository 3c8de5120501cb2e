//! `batchpipe resume` command implementation
//!
//! Picks up polling of a submitted job by id, e.g. after a crash or a
//! polling timeout, and downloads its results once completed.

use super::report;
use crate::config::Config;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::orchestrator;
use crate::progress;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

pub async fn run(config: Config, job_id: &str, cancel: CancellationToken) -> Result<()> {
    let ctx = PipelineContext::from_config(config, true, cancel).await?;

    println!("{} Resuming {}...", "→".cyan(), job_id);
    let spinner = progress::create_spinner(&format!("Waiting for {job_id}"));
    let result = orchestrator::resume(&ctx, job_id).await;
    spinner.finish_and_clear();

    let resumed = result?;
    report::print_job(&resumed.job);
    if let Some(download) = &resumed.download {
        report::print_download(download);
    }
    Ok(())
}
