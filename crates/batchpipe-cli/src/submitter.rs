//! Job submission: upload the artifact, create the remote job, record it
//!
//! Both remote calls create something upstream, so nothing here retries.
//! Failures are classified for the caller:
//!
//! | Outcome                                   | Result          |
//! |-------------------------------------------|-----------------|
//! | 4xx (validation, auth, quota)             | `Rejected`      |
//! | connection refused / DNS                  | `Unreachable`   |
//! | timeout, 5xx, unreadable 2xx, other I/O   | `Ambiguous`     |
//! | job created but record not saved          | `Persistence`   |

use crate::api::{InferenceApi, JobRequest};
use crate::error::{ApiError, SubmissionError, SubmitStage, TransportKind};
use crate::job::BatchJob;
use crate::store::{JobMirror, JobStore};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, instrument};

/// Everything needed to submit one packaged artifact
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub table: String,
    pub model: String,
    pub endpoint: String,
    pub completion_window: String,
    /// File name sent with the upload
    pub artifact_name: String,
    pub artifact: Vec<u8>,
    /// Local archive copy, recorded on the job
    pub artifact_path: Option<PathBuf>,
    pub record_count: usize,
}

/// Map an API failure at `stage` onto the submission taxonomy
pub fn classify(stage: SubmitStage, err: ApiError, uploaded_file_id: Option<String>) -> SubmissionError {
    match err {
        ApiError::Status { status, message } if (400..500).contains(&status) => {
            SubmissionError::Rejected {
                stage,
                status,
                message,
            }
        },
        ApiError::Transport {
            kind: TransportKind::Connect,
            message,
        }
        | ApiError::Config(message) => SubmissionError::Unreachable { stage, message },
        other => SubmissionError::Ambiguous {
            stage,
            uploaded_file_id,
            message: other.to_string(),
        },
    }
}

/// Upload, create the job, then persist its record before returning
///
/// The caller may advance the table watermark only after this succeeds.
#[instrument(skip(api, jobs, mirror, request), fields(table = %request.table, records = request.record_count))]
pub async fn submit(
    api: &dyn InferenceApi,
    jobs: &JobStore,
    mirror: &JobMirror,
    request: SubmitRequest,
    now: DateTime<Utc>,
) -> Result<BatchJob, SubmissionError> {
    let file_id = api
        .upload_artifact(&request.artifact_name, request.artifact)
        .await
        .map_err(|e| classify(SubmitStage::Upload, e, None))?;
    info!(file_id = %file_id, "Artifact uploaded");

    let mut metadata = BTreeMap::new();
    metadata.insert("table".to_string(), request.table.clone());
    metadata.insert("record_count".to_string(), request.record_count.to_string());
    let job_request = JobRequest {
        input_artifact_id: file_id.clone(),
        model: request.model.clone(),
        endpoint: request.endpoint,
        completion_window: request.completion_window,
        metadata,
    };

    let remote = api
        .create_job(&job_request)
        .await
        .map_err(|e| classify(SubmitStage::CreateJob, e, Some(file_id.clone())))?;

    let mut job = BatchJob::pending(
        remote.job_id,
        request.table,
        request.model,
        request.record_count,
        file_id,
        remote.created_at.unwrap_or(now),
    );
    job.input_artifact_path = request.artifact_path;

    if let Err(source) = jobs.save(&job) {
        error!(job_id = %job.job_id, error = %source, "Job created but not recorded");
        return Err(SubmissionError::Persistence {
            job_id: job.job_id,
            source,
        });
    }
    mirror.record(&job).await;

    info!(job_id = %job.job_id, "Batch job submitted");
    Ok(job)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::api::OpenAiBatchClient;
    use crate::job::JobStatus;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn request() -> SubmitRequest {
        SubmitRequest {
            table: "news".into(),
            model: "gpt-4.1-nano-2025-04-14".into(),
            endpoint: "/v1/chat/completions".into(),
            completion_window: "24h".into(),
            artifact_name: "batch_news_20250519_2120.jsonl".into(),
            artifact: b"{\"custom_id\":\"a\"}\n".to_vec(),
            artifact_path: Some(PathBuf::from("jsonl/batch_news_20250519_2120.jsonl")),
            record_count: 1,
        }
    }

    async fn mount_upload(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-in"})))
            .expect(1)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer, timeout_secs: u64) -> OpenAiBatchClient {
        OpenAiBatchClient::new(format!("{}/v1", server.uri()), "sk-test", timeout_secs).unwrap()
    }

    #[tokio::test]
    async fn test_submit_persists_pending_job() {
        let server = MockServer::start().await;
        mount_upload(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/batches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "batch_1", "status": "validating", "created_at": 1_747_689_600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let jobs = JobStore::new(dir.path());
        let job = submit(&client(&server, 5), &jobs, &JobMirror::disabled(), request(), Utc::now())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.input_artifact_ref, "file-in");
        assert_eq!(job.created_at, DateTime::from_timestamp(1_747_689_600, 0).unwrap());
        assert_eq!(jobs.load("batch_1").unwrap(), job);
    }

    #[tokio::test]
    async fn test_rejected_upload_creates_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/files"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Invalid file format for Batch API.", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/batches"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let jobs = JobStore::new(dir.path());
        let err = submit(&client(&server, 5), &jobs, &JobMirror::disabled(), request(), Utc::now())
            .await
            .unwrap_err();

        match err {
            SubmissionError::Rejected { stage, status, message } => {
                assert_eq!(stage, SubmitStage::Upload);
                assert_eq!(status, 400);
                assert!(message.contains("Invalid file format"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(jobs.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_timeout_is_ambiguous() {
        let server = MockServer::start().await;
        mount_upload(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/batches"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "batch_1", "status": "validating"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let jobs = JobStore::new(dir.path());
        let err = submit(&client(&server, 1), &jobs, &JobMirror::disabled(), request(), Utc::now())
            .await
            .unwrap_err();

        match err {
            SubmissionError::Ambiguous {
                stage,
                uploaded_file_id,
                ..
            } => {
                assert_eq!(stage, SubmitStage::CreateJob);
                assert_eq!(uploaded_file_id.as_deref(), Some("file-in"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(jobs.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_ambiguous() {
        let server = MockServer::start().await;
        mount_upload(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/batches"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = submit(
            &client(&server, 5),
            &JobStore::new(dir.path()),
            &JobMirror::disabled(),
            request(),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SubmissionError::Ambiguous { .. }));
    }

    #[tokio::test]
    async fn test_unsaveable_record_is_persistence_error() {
        let server = MockServer::start().await;
        mount_upload(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/batches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "batch_1", "status": "validating"
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("jobs");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = submit(
            &client(&server, 5),
            &JobStore::new(&blocker),
            &JobMirror::disabled(),
            request(),
            Utc::now(),
        )
        .await
        .unwrap_err();
        match err {
            SubmissionError::Persistence { job_id, .. } => assert_eq!(job_id, "batch_1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_classification() {
        let rejected = classify(SubmitStage::CreateJob, ApiError::status(429, "quota"), None);
        assert!(matches!(rejected, SubmissionError::Rejected { status: 429, .. }));

        let unreachable = classify(
            SubmitStage::Upload,
            ApiError::Transport {
                kind: TransportKind::Connect,
                message: "refused".into(),
            },
            None,
        );
        assert!(matches!(unreachable, SubmissionError::Unreachable { .. }));

        let ambiguous = classify(SubmitStage::Upload, ApiError::Decode("eof".into()), None);
        assert!(matches!(ambiguous, SubmissionError::Ambiguous { .. }));
    }
}
