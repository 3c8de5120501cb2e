//! API request and response types
//!
//! Wire shapes of the OpenAI-compatible files and batches endpoints, plus
//! the provider-neutral [`RemoteJob`] the rest of the crate works with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// Body of `POST /batches`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBatchRequest {
    pub input_file_id: String,
    pub endpoint: String,
    pub completion_window: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Per-request progress of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
}

/// Batch as returned by `POST /batches` and `GET /batches/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchObject {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub input_file_id: Option<String>,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub request_counts: Option<RequestCounts>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Error envelope: `{"error": {"message": ..., "type": ..., "code": ...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// What the submitter asks for when creating a job
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub input_artifact_id: String,
    pub model: String,
    pub endpoint: String,
    pub completion_window: String,
    pub metadata: BTreeMap<String, String>,
}

/// Remote view of a job
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteJob {
    pub job_id: String,
    /// Provider status string, e.g. `in_progress`
    pub status: String,
    pub input_artifact_id: Option<String>,
    /// Table named in the job metadata at submission
    pub table: Option<String>,
    pub model: Option<String>,
    pub output_artifact_id: Option<String>,
    pub error_artifact_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub request_counts: Option<RequestCounts>,
}

impl From<BatchObject> for RemoteJob {
    fn from(batch: BatchObject) -> Self {
        let metadata = batch.metadata.unwrap_or_default();
        Self {
            job_id: batch.id,
            status: batch.status,
            input_artifact_id: batch.input_file_id.filter(|id| !id.is_empty()),
            table: metadata.get("table").cloned(),
            model: metadata.get("model").cloned(),
            output_artifact_id: batch.output_file_id.filter(|id| !id.is_empty()),
            error_artifact_id: batch.error_file_id.filter(|id| !id.is_empty()),
            created_at: batch.created_at.and_then(|secs| DateTime::from_timestamp(secs, 0)),
            request_counts: batch.request_counts,
        }
    }
}
