//! Pipeline orchestration
//!
//! Stages report results; only this module decides what a failure means for
//! the run. Per table the order is fixed:
//!
//! 1. read the watermark and fetch newer records
//! 2. package them and archive the artifact locally
//! 3. upload + create the job, persist its record
//! 4. advance the watermark
//!
//! A failure before step 4 leaves the watermark where it was.

use crate::context::PipelineContext;
use crate::error::{BatchError, Result};
use crate::job::{BatchJob, JobStatus};
use crate::models;
use crate::retriever::DownloadOutcome;
use crate::submitter::{submit, SubmitRequest};
use batchpipe_ingest::fetcher::{fetch_records, FetchRequest};
use batchpipe_ingest::packager::{encode_artifact, package_records, write_artifact, PromptEntry, RequestTemplate};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

pub const DEFAULT_LOOKBACK_HOURS: u32 = 12;

/// Options shared by `run`, `dry-run` and `submit`
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Tables to process; empty means the project's `enabled_tables`
    pub tables: Vec<String>,
    pub hours: u32,
    /// Logical key or concrete model; `None` uses the configured default
    pub model: Option<String>,
    /// Let the lookback window replace the watermark for this run
    pub rewind: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            hours: DEFAULT_LOOKBACK_HOURS,
            model: None,
            rewind: false,
        }
    }
}

impl RunOptions {
    fn resolve_tables(&self, ctx: &PipelineContext) -> Result<Vec<String>> {
        let requested = if self.tables.is_empty() {
            &ctx.config.project.enabled_tables
        } else {
            &self.tables
        };
        let mut tables: Vec<String> = Vec::new();
        for table in requested {
            if !tables.contains(table) {
                tables.push(table.clone());
            }
        }
        if tables.is_empty() {
            return Err(BatchError::config(
                "no tables given; pass --table or set enabled_tables in batchpipe.toml",
            ));
        }
        Ok(tables)
    }

    fn resolve_model(&self, ctx: &PipelineContext) -> &'static str {
        models::resolve(self.model.as_deref().unwrap_or(&ctx.config.model_key))
    }
}

/// What happened to one table
#[derive(Debug, Clone, Default)]
pub struct TableReport {
    pub table: String,
    pub scanned: usize,
    pub fetched: usize,
    pub filtered_out: usize,
    pub duplicates: usize,
    /// Rows without a usable timestamp
    pub missing_timestamp: usize,
    /// Records without extractable text
    pub skipped: usize,
    pub entries: usize,
    pub artifact_path: Option<PathBuf>,
    pub job: Option<BatchJob>,
    /// Watermark after the run, when it moved
    pub watermark: Option<DateTime<Utc>>,
    pub download: Option<DownloadOutcome>,
}

/// Outcome of a `check-outputs` pass
#[derive(Debug, Default)]
pub struct CheckReport {
    pub checked: usize,
    pub downloaded: Vec<(BatchJob, DownloadOutcome)>,
    pub running: Vec<BatchJob>,
    /// Newly observed terminal jobs without results (failed, expired, cancelled)
    pub unsuccessful: Vec<BatchJob>,
    pub failures: Vec<(String, BatchError)>,
}

impl CheckReport {
    pub fn finish(self) -> Result<()> {
        finish(self.failures, self.checked)
    }
}

/// Outcome of a multi-table command
#[derive(Debug, Default)]
pub struct RunReport {
    pub tables: Vec<TableReport>,
    pub failures: Vec<(String, BatchError)>,
    /// Auto-resume pass done before submitting
    pub check: Option<CheckReport>,
}

impl RunReport {
    /// Turn recorded failures into the command result
    ///
    /// A single-table failure keeps its own error (and exit code); several
    /// tables collapse into [`BatchError::Partial`].
    pub fn finish(self) -> Result<()> {
        let total = self.tables.len() + self.failures.len();
        finish(self.failures, total)
    }
}

fn finish(mut failures: Vec<(String, BatchError)>, total: usize) -> Result<()> {
    match failures.len() {
        0 => Ok(()),
        1 if total <= 1 => Err(failures.remove(0).1),
        failed => Err(BatchError::Partial {
            failed,
            total: total.max(failed),
        }),
    }
}

/// Result of `resume`
#[derive(Debug, Clone)]
pub struct ResumeReport {
    pub job: BatchJob,
    pub download: Option<DownloadOutcome>,
}

struct Prepared {
    report: TableReport,
    entries: Vec<PromptEntry>,
    /// Watermark candidate once the job is recorded
    advance_to: Option<DateTime<Utc>>,
}

/// Fetch and package one table without side effects
#[instrument(skip(ctx, opts), fields(hours = opts.hours, rewind = opts.rewind))]
async fn prepare(
    ctx: &PipelineContext,
    table: &str,
    opts: &RunOptions,
    model: &str,
    now: DateTime<Utc>,
) -> Result<Prepared> {
    let mut report = TableReport {
        table: table.to_string(),
        ..TableReport::default()
    };

    if opts.hours == 0 {
        info!(table, "Lookback of 0 hours; nothing to fetch");
        return Ok(Prepared {
            report,
            entries: Vec::new(),
            advance_to: None,
        });
    }

    let full_scan = ctx.config.project.is_full_scan(table);
    let watermark = if full_scan {
        DateTime::<Utc>::UNIX_EPOCH
    } else {
        ctx.watermarks.get(table)?
    };
    info!(table, watermark = %watermark, full_scan, "Fetching records");

    let request = FetchRequest::new(table, watermark, now)
        .with_lookback_hours(opts.hours)
        .rewind(opts.rewind)
        .full_scan(full_scan);
    let fetched = fetch_records(ctx.source.as_ref(), &request).await?;

    report.scanned = fetched.scanned;
    report.fetched = fetched.records.len();
    report.filtered_out = fetched.filtered_out;
    report.duplicates = fetched.duplicates;
    report.missing_timestamp = fetched.missing_timestamp();
    if report.missing_timestamp > 0 {
        warn!(table, count = report.missing_timestamp, "Rows without a timestamp were skipped");
    }

    let template = RequestTemplate {
        model: model.to_string(),
        system_prompt: ctx.config.project.system_prompt().to_string(),
        endpoint: ctx.config.endpoint.clone(),
    };
    let packaged = package_records(table, &fetched.records, ctx.rules.rule_for(table), &template)?;
    report.skipped = packaged.skipped.len();
    report.entries = packaged.entries.len();

    let advance_to = if full_scan {
        None
    } else if ctx.config.project.advance_past_skipped {
        fetched.max_timestamp()
    } else {
        packaged.max_timestamp()
    };

    Ok(Prepared {
        report,
        entries: packaged.entries,
        advance_to,
    })
}

/// Archive, submit and record one prepared table, then move its watermark
async fn submit_prepared(
    ctx: &PipelineContext,
    prepared: Prepared,
    model: &str,
    now: DateTime<Utc>,
) -> Result<TableReport> {
    let Prepared {
        mut report,
        entries,
        advance_to,
    } = prepared;
    let table = report.table.clone();

    if entries.is_empty() {
        info!(table = %table, "No new records to submit");
        return Ok(report);
    }

    let api = ctx.api()?;
    let bytes = encode_artifact(&entries, &ctx.config.endpoint)?;
    let path = write_artifact(&ctx.config.artifact_dir, &table, now, &bytes)?;
    report.artifact_path = Some(path.clone());

    let request = SubmitRequest {
        table: table.clone(),
        model: model.to_string(),
        endpoint: ctx.config.endpoint.clone(),
        completion_window: ctx.config.completion_window.clone(),
        artifact_name: file_name(&path),
        artifact: bytes,
        artifact_path: Some(path),
        record_count: entries.len(),
    };
    let job = submit(api, &ctx.jobs, &ctx.mirror, request, now).await?;

    if let Some(timestamp) = advance_to {
        match ctx.watermarks.set(&table, timestamp) {
            Ok(value) => report.watermark = Some(value),
            Err(err) => {
                error!(table = %table, job_id = %job.job_id, error = %err, "Job recorded but watermark not saved");
                return Err(err.into());
            },
        }
    }

    report.job = Some(job);
    Ok(report)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "batch.jsonl".to_string())
}

/// Package without touching the API or the watermark
///
/// Artifacts go to the dry-run directory so they never mix with submitted
/// ones.
#[instrument(skip_all)]
pub async fn dry_run(ctx: &PipelineContext, opts: &RunOptions) -> Result<RunReport> {
    let tables = opts.resolve_tables(ctx)?;
    let model = opts.resolve_model(ctx);
    let now = ctx.clock.now();
    let dir = ctx.config.dry_run_artifact_dir();
    let mut report = RunReport::default();

    for table in tables {
        let result = async {
            let prepared = prepare(ctx, &table, opts, model, now).await?;
            let mut table_report = prepared.report;
            if !prepared.entries.is_empty() {
                let bytes = encode_artifact(&prepared.entries, &ctx.config.endpoint)?;
                table_report.artifact_path = Some(write_artifact(&dir, &table, now, &bytes)?);
            }
            Ok::<_, BatchError>(table_report)
        }
        .await;

        match result {
            Ok(table_report) => report.tables.push(table_report),
            Err(err) => {
                error!(table = %table, error = %err, "Dry run failed");
                report.failures.push((table, err));
            },
        }
    }

    Ok(report)
}

/// Submit every table without waiting for results
///
/// Starts with one non-blocking `check-outputs` pass so finished jobs from
/// earlier runs are collected.
#[instrument(skip_all)]
pub async fn submit_async(ctx: &PipelineContext, opts: &RunOptions) -> Result<RunReport> {
    let tables = opts.resolve_tables(ctx)?;
    let model = opts.resolve_model(ctx);
    let mut report = RunReport::default();

    match check_outputs(ctx).await {
        Ok(check) => report.check = Some(check),
        Err(err) => warn!(error = %err, "Checking earlier jobs failed; continuing with submission"),
    }

    for table in tables {
        let now = ctx.clock.now();
        let result = async {
            let prepared = prepare(ctx, &table, opts, model, now).await?;
            submit_prepared(ctx, prepared, model, now).await
        }
        .await;

        match result {
            Ok(table_report) => report.tables.push(table_report),
            Err(err) => {
                error!(table = %table, error = %err, "Submission failed");
                report.failures.push((table, err));
            },
        }
    }

    Ok(report)
}

/// Submit one table, wait for the job, and download its results
///
/// More than one table switches to [`submit_async`].
#[instrument(skip_all)]
pub async fn run_sync(ctx: &PipelineContext, opts: &RunOptions) -> Result<RunReport> {
    let tables = opts.resolve_tables(ctx)?;
    if tables.len() > 1 {
        info!(tables = tables.len(), "Several tables requested; submitting asynchronously");
        return submit_async(ctx, opts).await;
    }

    let model = opts.resolve_model(ctx);
    let now = ctx.clock.now();
    let prepared = prepare(ctx, &tables[0], opts, model, now).await?;
    let mut table_report = submit_prepared(ctx, prepared, model, now).await?;

    if let Some(job) = table_report.job.take() {
        let resumed = wait_and_download(ctx, &job.job_id).await?;
        table_report.download = resumed.download;
        table_report.job = Some(resumed.job);
    }

    Ok(RunReport {
        tables: vec![table_report],
        ..RunReport::default()
    })
}

/// Continue polling a known job by id, then download its results
#[instrument(skip(ctx))]
pub async fn resume(ctx: &PipelineContext, job_id: &str) -> Result<ResumeReport> {
    wait_and_download(ctx, job_id).await
}

async fn wait_and_download(ctx: &PipelineContext, job_id: &str) -> Result<ResumeReport> {
    let mut job = ctx.monitor()?.wait(job_id, &ctx.cancel).await?;

    let download = match job.status {
        JobStatus::Completed => Some(ctx.retriever()?.download(&mut job).await?),
        status => {
            warn!(job_id, status = %status, "Job ended without results");
            None
        },
    };

    Ok(ResumeReport { job, download })
}

/// One non-blocking pass over locally known jobs
///
/// Unfinished jobs are polled once; completed jobs without local results
/// are downloaded. Per-job failures are collected, not fatal.
#[instrument(skip_all)]
pub async fn check_outputs(ctx: &PipelineContext) -> Result<CheckReport> {
    let monitor = ctx.monitor()?;
    let retriever = ctx.retriever()?;
    let mut report = CheckReport::default();

    let pending = ctx.jobs.outstanding()?;
    info!(jobs = pending.len(), "Checking outstanding jobs");

    for mut job in pending {
        report.checked += 1;

        if !job.is_terminal() {
            if let Err(err) = monitor.poll_once(&mut job).await {
                warn!(job_id = %job.job_id, error = %err, "Status check failed");
                report.failures.push((job.job_id.clone(), err.into()));
                continue;
            }
        }

        match job.status {
            JobStatus::Completed if job.awaiting_download() => match retriever.download(&mut job).await {
                Ok(outcome) => report.downloaded.push((job, outcome)),
                Err(err) => {
                    warn!(job_id = %job.job_id, error = %err, "Download failed");
                    report.failures.push((job.job_id.clone(), err.into()));
                },
            },
            JobStatus::Pending | JobStatus::InProgress => report.running.push(job),
            JobStatus::Failed | JobStatus::Expired | JobStatus::Cancelled => report.unsuccessful.push(job),
            JobStatus::Completed => {},
        }
    }

    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_single_failure_keeps_error() {
        let failures = vec![("news".to_string(), BatchError::config("bad"))];
        let err = finish(failures, 1).unwrap_err();
        assert_eq!(err.exit_code(), 18);
    }

    #[test]
    fn test_finish_multiple_tables_is_partial() {
        let failures = vec![("news".to_string(), BatchError::config("bad"))];
        let err = finish(failures, 3).unwrap_err();
        assert!(matches!(err, BatchError::Partial { failed: 1, total: 3 }));
        assert!(finish(Vec::new(), 3).is_ok());
    }
}
