//! Result retrieval for completed jobs
//!
//! Files land at `{output_dir}/{job_id}/batch_{output|errors}_{created}.jsonl`
//! where `created` is the job creation time, so re-downloading a job always
//! targets the same path. Each file gets a `.complete` marker holding its
//! size and SHA-256; a file whose marker verifies is not fetched again.

use crate::api::InferenceApi;
use crate::clock::Clock;
use crate::error::{ApiError, DownloadError};
use crate::job::{BatchJob, JobStatus};
use crate::monitor::{next_delay, PollConfig};
use crate::store::{JobMirror, JobStore};
use batchpipe_common::checksum::ContentDigest;
use batchpipe_common::fs::{read_json_opt, write_atomic, write_json_atomic};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 3;

/// Retry policy for artifact downloads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub attempts: u32,
    pub backoff: PollConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            backoff: PollConfig {
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
                deadline: Duration::from_secs(120),
            },
        }
    }
}

/// Where a job's results ended up
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadOutcome {
    pub output_path: Option<PathBuf>,
    pub error_path: Option<PathBuf>,
    /// Files actually fetched; zero when everything was already on disk
    pub downloaded: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy)]
enum ArtifactKind {
    Output,
    Errors,
}

impl ArtifactKind {
    fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Output => "output",
            ArtifactKind::Errors => "errors",
        }
    }
}

pub fn marker_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".complete");
    PathBuf::from(name)
}

/// Whether `path` has a marker matching its current contents
pub fn is_verified(path: &Path) -> bool {
    match read_json_opt::<ContentDigest>(marker_path(path)) {
        Ok(Some(digest)) => digest.verify_file(path).is_ok(),
        _ => false,
    }
}

pub struct ResultRetriever<'a> {
    api: &'a dyn InferenceApi,
    jobs: &'a JobStore,
    mirror: &'a JobMirror,
    clock: &'a dyn Clock,
    output_dir: &'a Path,
    retry: RetryConfig,
}

impl<'a> ResultRetriever<'a> {
    pub fn new(
        api: &'a dyn InferenceApi,
        jobs: &'a JobStore,
        mirror: &'a JobMirror,
        clock: &'a dyn Clock,
        output_dir: &'a Path,
    ) -> Self {
        Self {
            api,
            jobs,
            mirror,
            clock,
            output_dir,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Deterministic local path for one of the job's artifacts
    fn target_path(&self, job: &BatchJob, kind: ArtifactKind) -> PathBuf {
        let created = job.created_at.format("%Y%m%d_%H%M%S");
        self.output_dir
            .join(crate::store::state_file_name(&job.job_id))
            .join(format!("batch_{}_{created}.jsonl", kind.as_str()))
    }

    /// Download the output and error artifacts of a completed job
    ///
    /// Safe to call repeatedly: verified files are skipped and the job
    /// record is only rewritten when something changed.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn download(&self, job: &mut BatchJob) -> Result<DownloadOutcome, DownloadError> {
        if job.status != JobStatus::Completed {
            return Err(DownloadError::NotCompleted {
                job_id: job.job_id.clone(),
                status: job.status.to_string(),
            });
        }

        let mut outcome = DownloadOutcome::default();
        let artifacts = [
            (ArtifactKind::Output, job.output_artifact_ref.clone()),
            (ArtifactKind::Errors, job.error_artifact_ref.clone()),
        ];

        for (kind, artifact_ref) in artifacts {
            let Some(artifact_id) = artifact_ref else {
                continue;
            };
            let path = self.target_path(job, kind);

            if is_verified(&path) {
                debug!(path = %path.display(), "Result file already complete");
            } else {
                let bytes = self.fetch_with_retry(&job.job_id, &artifact_id).await?;
                self.persist(&job.job_id, &path, &bytes)?;
                outcome.downloaded += 1;
                outcome.bytes += bytes.len() as u64;
                info!(kind = kind.as_str(), path = %path.display(), bytes = bytes.len(), "Result file saved");
            }

            match kind {
                ArtifactKind::Output => outcome.output_path = Some(path),
                ArtifactKind::Errors => outcome.error_path = Some(path),
            }
        }

        if outcome.output_path.is_none() && outcome.error_path.is_none() {
            warn!("Completed job has no result files");
        }

        let changed = job.downloaded_at.is_none()
            || job.output_path != outcome.output_path
            || job.error_path != outcome.error_path;
        if changed {
            job.output_path.clone_from(&outcome.output_path);
            job.error_path.clone_from(&outcome.error_path);
            job.downloaded_at = Some(self.clock.now());
            self.jobs.save(job)?;
            self.mirror.record(job).await;
        }

        Ok(outcome)
    }

    async fn fetch_with_retry(&self, job_id: &str, artifact_id: &str) -> Result<Vec<u8>, DownloadError> {
        let mut delay = self.retry.backoff.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.api.download_artifact(artifact_id).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_recoverable() && attempt < self.retry.attempts => {
                    warn!(artifact_id, attempt, error = %err, "Download failed; retrying");
                    self.clock.sleep(delay).await;
                    delay = next_delay(delay, &self.retry.backoff);
                },
                Err(source) => return Err(self.exhausted(job_id, artifact_id, attempt, source)),
            }
        }
    }

    fn exhausted(&self, job_id: &str, artifact_id: &str, attempts: u32, source: ApiError) -> DownloadError {
        DownloadError::Api {
            job_id: job_id.to_string(),
            file_id: artifact_id.to_string(),
            attempts,
            source,
        }
    }

    fn persist(&self, job_id: &str, path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
        let write_error = |source| DownloadError::Write {
            job_id: job_id.to_string(),
            source,
        };
        write_atomic(path, bytes).map_err(write_error)?;
        write_json_atomic(marker_path(path), &ContentDigest::of(bytes)).map_err(write_error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::api::OpenAiBatchClient;
    use crate::clock::ManualClock;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const OUTPUT: &str = "{\"custom_id\":\"a\",\"response\":{\"status_code\":200}}\n";

    fn completed_job() -> BatchJob {
        let created = DateTime::from_timestamp(1_747_689_600, 0).unwrap();
        let mut job = BatchJob::pending("batch_1", "news", "m", 1, "file-in", created);
        job.transition(JobStatus::Completed);
        job.output_artifact_ref = Some("file-out".into());
        job
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            attempts: 3,
            backoff: PollConfig {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(4),
                multiplier: 2.0,
                deadline: Duration::from_secs(10),
            },
        }
    }

    #[tokio::test]
    async fn test_download_then_noop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/files/file-out/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OUTPUT))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let jobs = JobStore::new(dir.path().join("jobs"));
        let output_dir = dir.path().join("output");
        let client = OpenAiBatchClient::new(format!("{}/v1", server.uri()), "k", 5).unwrap();
        let clock = ManualClock::new(Utc::now());
        let mirror = JobMirror::disabled();
        let retriever = ResultRetriever::new(&client, &jobs, &mirror, &clock, &output_dir);

        let mut job = completed_job();
        let first = retriever.download(&mut job).await.unwrap();
        let expected = output_dir.join("batch_1").join("batch_output_20250519_212000.jsonl");
        assert_eq!(first.output_path.as_deref(), Some(expected.as_path()));
        assert_eq!(first.downloaded, 1);
        assert_eq!(std::fs::read_to_string(&expected).unwrap(), OUTPUT);
        assert!(is_verified(&expected));
        assert!(jobs.load("batch_1").unwrap().downloaded_at.is_some());

        let second = retriever.download(&mut job).await.unwrap();
        assert_eq!(second.downloaded, 0);
        assert_eq!(second.output_path, first.output_path);
    }

    #[tokio::test]
    async fn test_tampered_file_is_fetched_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/files/file-out/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OUTPUT))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let jobs = JobStore::new(dir.path().join("jobs"));
        let client = OpenAiBatchClient::new(format!("{}/v1", server.uri()), "k", 5).unwrap();
        let clock = ManualClock::new(Utc::now());
        let mirror = JobMirror::disabled();
        let retriever = ResultRetriever::new(&client, &jobs, &mirror, &clock, dir.path());

        let mut job = completed_job();
        let path = retriever.download(&mut job).await.unwrap().output_path.unwrap();
        std::fs::write(&path, b"truncated").unwrap();
        assert!(!is_verified(&path));

        let again = retriever.download(&mut job).await.unwrap();
        assert_eq!(again.downloaded, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), OUTPUT);
    }

    #[tokio::test]
    async fn test_transient_failures_retry_then_give_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/files/file-out/content"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let jobs = JobStore::new(dir.path().join("jobs"));
        let client = OpenAiBatchClient::new(format!("{}/v1", server.uri()), "k", 5).unwrap();
        let clock = ManualClock::new(Utc::now());
        let mirror = JobMirror::disabled();
        let retriever =
            ResultRetriever::new(&client, &jobs, &mirror, &clock, dir.path()).with_retry(fast_retry());

        let err = retriever.download(&mut completed_job()).await.unwrap_err();
        assert!(matches!(err, DownloadError::Api { attempts: 3, .. }));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert!(jobs.get("batch_1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_file_is_saved_alongside() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/files/file-err/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"custom_id\":\"b\"}\n"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let jobs = JobStore::new(dir.path().join("jobs"));
        let client = OpenAiBatchClient::new(format!("{}/v1", server.uri()), "k", 5).unwrap();
        let clock = ManualClock::new(Utc::now());
        let mirror = JobMirror::disabled();
        let retriever = ResultRetriever::new(&client, &jobs, &mirror, &clock, dir.path());

        let mut job = completed_job();
        job.output_artifact_ref = None;
        job.error_artifact_ref = Some("file-err".into());
        let outcome = retriever.download(&mut job).await.unwrap();
        assert!(outcome.output_path.is_none());
        assert!(outcome
            .error_path
            .unwrap()
            .ends_with("batch_1/batch_errors_20250519_212000.jsonl"));
    }

    #[tokio::test]
    async fn test_not_completed() {
        let dir = TempDir::new().unwrap();
        let jobs = JobStore::new(dir.path());
        let client = OpenAiBatchClient::new("http://127.0.0.1:9/v1", "k", 1).unwrap();
        let clock = ManualClock::new(Utc::now());
        let mirror = JobMirror::disabled();
        let retriever = ResultRetriever::new(&client, &jobs, &mirror, &clock, dir.path());

        let mut job = completed_job();
        job.status = JobStatus::InProgress;
        let err = retriever.download(&mut job).await.unwrap_err();
        assert!(matches!(err, DownloadError::NotCompleted { .. }));
    }
}
