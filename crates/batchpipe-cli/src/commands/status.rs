//! `batchpipe status` command implementation
//!
//! Lists locally known jobs. Reads job records only; no API calls.

use super::report;
use crate::config::Config;
use crate::error::Result;
use crate::job::JobStatus;
use crate::store::{JobStore, WatermarkStore};
use colored::Colorize;

/// Show recorded jobs and table watermarks
pub async fn run(config: &Config) -> Result<()> {
    let jobs = JobStore::new(config.jobs_dir()).list()?;

    if jobs.is_empty() {
        println!("No batch jobs recorded.");
        println!("Run 'batchpipe submit' to create one.");
    } else {
        println!("{}", "Batch Jobs:".cyan().bold());
        println!();
        for job in &jobs {
            report::print_job(job);
            println!();
        }

        let awaiting = jobs.iter().filter(|j| j.awaiting_download()).count();
        let running = jobs.iter().filter(|j| !j.is_terminal()).count();
        let failed = jobs
            .iter()
            .filter(|j| j.is_terminal() && j.status != JobStatus::Completed)
            .count();

        println!("{}", "Summary:".cyan().bold());
        println!("  Total jobs:        {}", jobs.len());
        println!("  Running:           {running}");
        println!("  Awaiting download: {awaiting}");
        println!("  Unsuccessful:      {failed}");
        println!("  State dir:         {}", config.state_dir.display());
    }

    let watermarks = WatermarkStore::new(config.watermark_dir());
    let mut tables: Vec<&String> = config.project.enabled_tables.iter().collect();
    for job in &jobs {
        if !tables.contains(&&job.table) {
            tables.push(&job.table);
        }
    }
    if !tables.is_empty() {
        println!();
        println!("{}", "Watermarks:".cyan().bold());
        for table in tables {
            let value = watermarks.get(table)?;
            if value == chrono::DateTime::<chrono::Utc>::UNIX_EPOCH {
                println!("  {table}: {}", "never".dimmed());
            } else {
                println!("  {table}: {}", value.to_rfc3339());
            }
        }
    }

    Ok(())
}
