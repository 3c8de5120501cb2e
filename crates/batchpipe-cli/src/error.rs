//! Error types for the batchpipe CLI
//!
//! Each pipeline stage has its own error enum so the orchestrator can decide
//! what is retryable. [`BatchError`] is the top-level type returned by
//! commands; its messages are user-facing and [`BatchError::exit_code`] maps
//! it to a stable process exit status for cron and CI callers.

use batchpipe_ingest::{PackagingError, SourceError};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// How a request failed before a response arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Request may have reached the server
    Timeout,
    /// Connection never established; nothing was sent
    Connect,
    Other,
}

/// Errors talking to the inference HTTP API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed ({kind:?}): {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Worth retrying for idempotent reads (polling, downloads)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 429,
            ApiError::Decode(_) | ApiError::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApiError::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return ApiError::status(status.as_u16(), err.to_string());
        }
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            TransportKind::Connect
        } else {
            TransportKind::Other
        };
        ApiError::Transport {
            kind,
            message: err.to_string(),
        }
    }
}

/// Errors reading or writing local pipeline state
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State file error for {path}: {source}")]
    File {
        path: String,
        #[source]
        source: batchpipe_common::CommonError,
    },

    #[error("Job record not found: {0}")]
    JobNotFound(String),
}

/// Which half of a submission failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStage {
    Upload,
    CreateJob,
}

impl std::fmt::Display for SubmitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitStage::Upload => f.write_str("artifact upload"),
            SubmitStage::CreateJob => f.write_str("job creation"),
        }
    }
}

/// Errors from uploading an artifact and creating the remote job
#[derive(Error, Debug)]
pub enum SubmissionError {
    /// Upstream refused the request; nothing to reconcile
    #[error("Submission rejected during {stage} ({status}): {message}")]
    Rejected {
        stage: SubmitStage,
        status: u16,
        message: String,
    },

    /// The request may have taken effect; must be reconciled by hand
    #[error("Ambiguous outcome during {stage}{}: {message}. Check the provider console before resubmitting.", .uploaded_file_id.as_ref().map(|id| format!(" (uploaded file {id})")).unwrap_or_default())]
    Ambiguous {
        stage: SubmitStage,
        uploaded_file_id: Option<String>,
        message: String,
    },

    /// Connection failed before anything was sent
    #[error("Inference API unreachable during {stage}: {message}")]
    Unreachable { stage: SubmitStage, message: String },

    /// Job was created remotely but could not be recorded locally
    #[error("Job {job_id} was created but its record could not be saved: {source}")]
    Persistence {
        job_id: String,
        #[source]
        source: StoreError,
    },
}

/// Errors from the poll loop
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Job {job_id} still {status} after {waited_secs}s; resume later with 'batchpipe resume {job_id}'")]
    PollingTimeout {
        job_id: String,
        status: String,
        waited_secs: u64,
    },

    #[error("Polling of job {job_id} interrupted; resume with 'batchpipe resume {job_id}'")]
    Interrupted { job_id: String },

    #[error("Polling job {job_id} failed: {source}")]
    Api {
        job_id: String,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors fetching job results
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Job {job_id} has not completed (status {status}); nothing to download")]
    NotCompleted { job_id: String, status: String },

    #[error("Downloading {file_id} for job {job_id} failed after {attempts} attempts: {source}")]
    Api {
        job_id: String,
        file_id: String,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("Writing results for job {job_id} failed: {source}")]
    Write {
        job_id: String,
        #[source]
        source: batchpipe_common::CommonError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level error returned by commands
#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Packaging failed: {0}")]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Local state error: {0}")]
    Store(#[from] StoreError),

    #[error("Inference API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}. Check your environment variables or batchpipe.toml.")]
    Config(String),

    #[error("{failed} of {total} tables failed")]
    Partial { failed: usize, total: usize },
}

impl BatchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Stable process exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            BatchError::Submission(SubmissionError::Rejected { .. }) => 10,
            BatchError::Submission(SubmissionError::Ambiguous { .. })
            | BatchError::Submission(SubmissionError::Persistence { .. }) => 11,
            BatchError::Submission(SubmissionError::Unreachable { .. }) => 15,
            BatchError::Monitor(MonitorError::PollingTimeout { .. }) => 12,
            BatchError::Monitor(MonitorError::Interrupted { .. }) => 16,
            BatchError::Monitor(MonitorError::Api { .. }) => 15,
            BatchError::Monitor(MonitorError::Store(_)) => 1,
            BatchError::Download(_) => 13,
            BatchError::Source(_) => 14,
            BatchError::Api(_) => 15,
            BatchError::Packaging(_) => 17,
            BatchError::Config(_) => 18,
            BatchError::Store(_) | BatchError::Partial { .. } => 1,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let rejected = BatchError::from(SubmissionError::Rejected {
            stage: SubmitStage::Upload,
            status: 400,
            message: "bad jsonl".into(),
        });
        assert_eq!(rejected.exit_code(), 10);

        let ambiguous = BatchError::from(SubmissionError::Ambiguous {
            stage: SubmitStage::CreateJob,
            uploaded_file_id: Some("file-1".into()),
            message: "timed out".into(),
        });
        assert_eq!(ambiguous.exit_code(), 11);
        assert!(ambiguous.to_string().contains("uploaded file file-1"));

        let timeout = BatchError::from(MonitorError::PollingTimeout {
            job_id: "batch_1".into(),
            status: "in_progress".into(),
            waited_secs: 60,
        });
        assert_eq!(timeout.exit_code(), 12);

        assert_eq!(BatchError::config("x").exit_code(), 18);
        assert_eq!(
            BatchError::from(SourceError::unavailable("news", "denied")).exit_code(),
            14
        );
    }

    #[test]
    fn test_recoverable_api_errors() {
        assert!(ApiError::status(503, "busy").is_recoverable());
        assert!(ApiError::status(429, "slow down").is_recoverable());
        assert!(!ApiError::status(404, "gone").is_recoverable());
        assert!(!ApiError::Decode("eof".into()).is_recoverable());
        assert!(ApiError::Transport {
            kind: TransportKind::Timeout,
            message: "t".into()
        }
        .is_recoverable());
    }
}
