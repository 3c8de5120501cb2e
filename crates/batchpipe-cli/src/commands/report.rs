//! Console rendering of run, check and job reports

use crate::job::{BatchJob, JobStatus};
use crate::orchestrator::{CheckReport, RunReport, TableReport};
use crate::progress::format_bytes;
use crate::retriever::DownloadOutcome;
use colored::{ColoredString, Colorize};

pub fn status_label(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Pending => status.as_str().yellow(),
        JobStatus::InProgress => status.as_str().cyan(),
        JobStatus::Completed => status.as_str().green(),
        JobStatus::Failed | JobStatus::Expired | JobStatus::Cancelled => status.as_str().red(),
    }
}

pub fn print_table(report: &TableReport) {
    println!("{}", report.table.green().bold());
    println!(
        "  Records:   {} fetched ({} scanned, {} outside window, {} duplicates)",
        report.fetched, report.scanned, report.filtered_out, report.duplicates
    );
    if report.missing_timestamp > 0 {
        println!("  {} {} without timestamp", "!".yellow(), report.missing_timestamp);
    }
    println!("  Entries:   {} ({} skipped, no text)", report.entries, report.skipped);
    if let Some(path) = &report.artifact_path {
        println!("  Artifact:  {}", path.display());
    }
    if let Some(job) = &report.job {
        println!("  Job:       {} [{}]", job.job_id, status_label(job.status));
    }
    if let Some(watermark) = report.watermark {
        println!("  Watermark: {}", watermark.to_rfc3339());
    }
    if let Some(download) = &report.download {
        print_download(download);
    }
    println!();
}

pub fn print_download(download: &DownloadOutcome) {
    if let Some(path) = &download.output_path {
        println!("  Output:    {}", path.display());
    }
    if let Some(path) = &download.error_path {
        println!("  Errors:    {}", path.display());
    }
    if download.downloaded > 0 {
        println!(
            "  Fetched:   {} file(s), {}",
            download.downloaded,
            format_bytes(download.bytes)
        );
    }
}

pub fn print_failures(failures: &[(String, crate::error::BatchError)]) {
    for (name, err) in failures {
        println!("{} {}: {}", "✗".red(), name, err);
    }
}

pub fn print_check(report: &CheckReport) {
    if report.checked == 0 {
        println!("No outstanding jobs.");
        return;
    }

    println!("{}", "Outstanding jobs:".cyan().bold());
    for (job, download) in &report.downloaded {
        println!("{} {} ({}) results saved", "✓".green(), job.job_id, job.table);
        print_download(download);
    }
    for job in &report.running {
        println!("{} {} ({}) {}", "…".cyan(), job.job_id, job.table, status_label(job.status));
    }
    for job in &report.unsuccessful {
        println!("{} {} ({}) {}", "✗".red(), job.job_id, job.table, status_label(job.status));
    }
    print_failures(&report.failures);
    println!();
}

pub fn print_run(report: &RunReport) {
    if let Some(check) = &report.check {
        print_check(check);
    }
    for table in &report.tables {
        print_table(table);
    }
    print_failures(&report.failures);
}

pub fn print_job(job: &BatchJob) {
    println!("{} [{}]", job.job_id.green(), status_label(job.status));
    println!("  Table:      {}", job.table);
    println!("  Model:      {}", job.model);
    println!("  Records:    {}", job.record_count);
    println!("  Created:    {}", job.created_at.to_rfc3339());
    if let Some(polled) = job.last_polled_at {
        println!("  Last poll:  {}", polled.to_rfc3339());
    }
    match (job.downloaded_at, &job.output_path) {
        (Some(at), Some(path)) => println!("  Downloaded: {} ({})", at.to_rfc3339(), path.display()),
        (Some(at), None) => println!("  Downloaded: {} (no output file)", at.to_rfc3339()),
        (None, _) if job.status == JobStatus::Completed => {
            println!("  Downloaded: {}", "pending; run 'batchpipe check-outputs'".yellow())
        },
        (None, _) => {},
    }
}
