//! `batchpipe check-outputs` command implementation
//!
//! Polls every unfinished job once and downloads results of completed ones.

use super::report;
use crate::config::Config;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::orchestrator;
use tokio_util::sync::CancellationToken;

pub async fn run(config: Config, cancel: CancellationToken) -> Result<()> {
    let ctx = PipelineContext::from_config(config, true, cancel).await?;

    let check = orchestrator::check_outputs(&ctx).await?;
    report::print_check(&check);
    check.finish()
}
