//! Inference API access
//!
//! The pipeline talks to the provider only through [`InferenceApi`], so the
//! lifecycle can be exercised against an in-process fake.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::OpenAiBatchClient;
pub use types::{JobRequest, RemoteJob, RequestCounts};

use crate::error::ApiError;
use async_trait::async_trait;

/// Remote batch-inference operations
#[async_trait]
pub trait InferenceApi: Send + Sync {
    /// Upload a JSONL artifact; returns the remote file id
    async fn upload_artifact(&self, filename: &str, bytes: Vec<u8>) -> Result<String, ApiError>;

    /// Create a batch job over an uploaded artifact
    async fn create_job(&self, request: &JobRequest) -> Result<RemoteJob, ApiError>;

    /// Current remote state of a job
    async fn get_job(&self, job_id: &str) -> Result<RemoteJob, ApiError>;

    /// Raw bytes of a remote file
    async fn download_artifact(&self, artifact_id: &str) -> Result<Vec<u8>, ApiError>;
}
