//! Job monitor: poll a remote job until it reaches a terminal status
//!
//! The loop sleeps with exponential backoff between polls, capped per wait
//! and bounded by a total deadline. Hitting the deadline or a cancellation
//! leaves the job record untouched apart from `last_polled_at`, so the job
//! can be picked up again with `batchpipe resume <job_id>`.

use crate::api::{InferenceApi, RemoteJob};
use crate::clock::Clock;
use crate::config::PollSettings;
use crate::error::{ApiError, MonitorError, StoreError};
use crate::job::{BatchJob, JobStatus};
use crate::store::{JobMirror, JobStore};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Backoff schedule for the poll loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// Wait after the first poll
    pub initial_delay: Duration,
    /// Upper bound on a single wait
    pub max_delay: Duration,
    /// Growth factor applied after each poll
    pub multiplier: f64,
    /// Total time allowed before giving up with `PollingTimeout`
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollSettings::default().into()
    }
}

impl From<PollSettings> for PollConfig {
    fn from(settings: PollSettings) -> Self {
        Self {
            initial_delay: Duration::from_secs(settings.initial_secs),
            max_delay: Duration::from_secs(settings.max_secs),
            multiplier: 2.0,
            deadline: Duration::from_secs(settings.deadline_secs),
        }
    }
}

/// Next wait after `current`, clamped to `max_delay`
pub fn next_delay(current: Duration, config: &PollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// `delay` truncated to the time left before `deadline`
///
/// An overflowing subtraction (unbounded deadline, clock moved backwards)
/// leaves `delay` as is.
fn bounded_wait(delay: Duration, deadline: chrono::Duration, elapsed: chrono::Duration) -> Duration {
    match deadline.checked_sub(&elapsed) {
        Some(remaining) => delay.min(remaining.to_std().unwrap_or(Duration::ZERO)),
        None => delay,
    }
}

pub struct JobMonitor<'a> {
    api: &'a dyn InferenceApi,
    jobs: &'a JobStore,
    mirror: &'a JobMirror,
    clock: &'a dyn Clock,
    config: PollConfig,
}

impl<'a> JobMonitor<'a> {
    pub fn new(
        api: &'a dyn InferenceApi,
        jobs: &'a JobStore,
        mirror: &'a JobMirror,
        clock: &'a dyn Clock,
        config: PollConfig,
    ) -> Self {
        Self {
            api,
            jobs,
            mirror,
            clock,
            config,
        }
    }

    /// Local record for `job_id`, or one adopted from the remote job
    ///
    /// Remote status is never taken from the record; the record only tells
    /// us the job was already submitted.
    pub async fn load_or_adopt(&self, job_id: &str) -> Result<BatchJob, MonitorError> {
        if let Some(job) = self.jobs.get(job_id)? {
            return Ok(job);
        }

        let remote = self.api.get_job(job_id).await.map_err(|source| {
            if matches!(source, ApiError::Status { status: 404, .. }) {
                MonitorError::Store(StoreError::JobNotFound(job_id.to_string()))
            } else {
                MonitorError::Api {
                    job_id: job_id.to_string(),
                    source,
                }
            }
        })?;

        warn!(job_id, "No local record for job; adopting remote state");
        let mut job = BatchJob::pending(
            remote.job_id.clone(),
            remote.table.clone().unwrap_or_else(|| "unknown".to_string()),
            remote.model.clone().unwrap_or_default(),
            remote
                .request_counts
                .map(|c| c.total as usize)
                .unwrap_or_default(),
            remote.input_artifact_id.clone().unwrap_or_default(),
            remote.created_at.unwrap_or_else(|| self.clock.now()),
        );
        self.apply(&mut job, &remote).await?;
        Ok(job)
    }

    /// Fold one remote observation into `job` and persist it
    ///
    /// Returns whether the status changed.
    async fn apply(&self, job: &mut BatchJob, remote: &RemoteJob) -> Result<bool, MonitorError> {
        job.last_polled_at = Some(self.clock.now());
        if remote.output_artifact_id.is_some() {
            job.output_artifact_ref.clone_from(&remote.output_artifact_id);
        }
        if remote.error_artifact_id.is_some() {
            job.error_artifact_ref.clone_from(&remote.error_artifact_id);
        }

        let previous = job.status;
        let changed = match JobStatus::from_remote(&remote.status) {
            Some(status) => job.transition(status),
            None => {
                warn!(job_id = %job.job_id, status = %remote.status, "Unrecognized remote status");
                false
            },
        };

        self.jobs.save(job)?;
        if changed {
            info!(job_id = %job.job_id, from = %previous, to = %job.status, "Job status changed");
            self.mirror.record(job).await;
        } else {
            debug!(job_id = %job.job_id, status = %job.status, "Job status unchanged");
        }
        Ok(changed)
    }

    /// Single status refresh without waiting
    pub async fn poll_once(&self, job: &mut BatchJob) -> Result<bool, MonitorError> {
        let remote = self
            .api
            .get_job(&job.job_id)
            .await
            .map_err(|source| MonitorError::Api {
                job_id: job.job_id.clone(),
                source,
            })?;
        self.apply(job, &remote).await
    }

    /// Poll until terminal, the deadline, or cancellation
    ///
    /// Transient API errors are logged and retried on the same schedule;
    /// anything else ends the wait.
    #[instrument(skip(self, cancel))]
    pub async fn wait(&self, job_id: &str, cancel: &CancellationToken) -> Result<BatchJob, MonitorError> {
        let mut job = self.load_or_adopt(job_id).await?;
        let started = self.clock.now();
        let deadline = chrono::Duration::from_std(self.config.deadline).unwrap_or(chrono::Duration::MAX);
        let mut delay = self.config.initial_delay;
        let mut polls = 0u32;

        info!(job_id, status = %job.status, "Waiting for batch job");

        loop {
            if cancel.is_cancelled() {
                return Err(MonitorError::Interrupted {
                    job_id: job_id.to_string(),
                });
            }

            polls += 1;
            let polled = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(MonitorError::Interrupted { job_id: job_id.to_string() });
                }
                result = self.api.get_job(job_id) => result,
            };

            match polled {
                Ok(remote) => {
                    self.apply(&mut job, &remote).await?;
                    if job.is_terminal() {
                        info!(job_id, status = %job.status, polls, "Batch job finished");
                        return Ok(job);
                    }
                },
                Err(err) if err.is_recoverable() => {
                    warn!(job_id, error = %err, attempt = polls, "Poll failed; will retry");
                },
                Err(source) => {
                    return Err(MonitorError::Api {
                        job_id: job_id.to_string(),
                        source,
                    })
                },
            }

            let elapsed = self.clock.now() - started;
            if elapsed >= deadline {
                warn!(job_id, status = %job.status, polls, "Polling deadline reached");
                return Err(MonitorError::PollingTimeout {
                    job_id: job_id.to_string(),
                    status: job.status.to_string(),
                    waited_secs: elapsed.num_seconds().max(0) as u64,
                });
            }

            let wait = bounded_wait(delay, deadline, elapsed);
            debug!(job_id, wait_secs = wait.as_secs(), "Sleeping before next poll");

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(MonitorError::Interrupted { job_id: job_id.to_string() });
                }
                _ = self.clock.sleep(wait) => {}
            }

            delay = next_delay(delay, &self.config);
        }
    }
}
