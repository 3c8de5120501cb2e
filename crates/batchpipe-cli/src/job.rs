//! Batch job record
//!
//! One [`BatchJob`] per submitted artifact, persisted under
//! `state/jobs/{job_id}.json` so a crashed process can resume by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of a batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl JobStatus {
    /// No transition happens after a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Expired | JobStatus::Cancelled
        )
    }

    /// Map a provider status string
    ///
    /// Unknown strings map to `None`; the caller keeps the previous status.
    pub fn from_remote(status: &str) -> Option<Self> {
        match status {
            "validating" | "pending" | "queued" => Some(JobStatus::Pending),
            "in_progress" | "finalizing" | "cancelling" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "expired" => Some(JobStatus::Expired),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Expired => "expired",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record of one remote batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: String,
    pub table: String,
    pub status: JobStatus,
    pub model: String,
    pub record_count: usize,

    /// Remote id of the uploaded submission artifact
    pub input_artifact_ref: String,
    /// Local archive copy of the submission artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_artifact_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_artifact_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_artifact_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_path: Option<PathBuf>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
    /// Terminal status as first observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_status: Option<JobStatus>,
}

impl BatchJob {
    /// New record for a freshly created job
    pub fn pending(
        job_id: impl Into<String>,
        table: impl Into<String>,
        model: impl Into<String>,
        record_count: usize,
        input_artifact_ref: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            table: table.into(),
            status: JobStatus::Pending,
            model: model.into(),
            record_count,
            input_artifact_ref: input_artifact_ref.into(),
            input_artifact_path: None,
            output_artifact_ref: None,
            error_artifact_ref: None,
            output_path: None,
            error_path: None,
            created_at,
            last_polled_at: None,
            downloaded_at: None,
            final_status: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Completed with results still to fetch
    pub fn awaiting_download(&self) -> bool {
        self.status == JobStatus::Completed && self.downloaded_at.is_none()
    }

    /// Apply a status transition; returns whether anything changed
    pub fn transition(&mut self, status: JobStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        if status.is_terminal() && self.final_status.is_none() {
            self.final_status = Some(status);
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_mapping() {
        assert_eq!(JobStatus::from_remote("validating"), Some(JobStatus::Pending));
        assert_eq!(JobStatus::from_remote("finalizing"), Some(JobStatus::InProgress));
        assert_eq!(JobStatus::from_remote("cancelling"), Some(JobStatus::InProgress));
        assert_eq!(JobStatus::from_remote("expired"), Some(JobStatus::Expired));
        assert_eq!(JobStatus::from_remote("paused"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_transition_records_final_status() {
        let mut job = BatchJob::pending("batch_1", "news", "m", 3, "file-1", Utc::now());
        assert!(!job.transition(JobStatus::Pending));
        assert!(job.transition(JobStatus::InProgress));
        assert!(job.final_status.is_none());
        assert!(job.transition(JobStatus::Completed));
        assert_eq!(job.final_status, Some(JobStatus::Completed));
        assert!(job.awaiting_download());
    }

    #[test]
    fn test_record_json_shape() {
        let job = BatchJob::pending("batch_1", "news", "m", 3, "file-1", Utc::now());
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "pending");
        assert!(value.get("output_artifact_ref").is_none());
        let back: BatchJob = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }
}
