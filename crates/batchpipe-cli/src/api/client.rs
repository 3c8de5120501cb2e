//! HTTP client for the OpenAI-compatible batch API

use crate::api::{endpoints, types::*, InferenceApi};
use crate::config::Config;
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use std::time::Duration;
use tracing::{debug, instrument};

/// Batch API client authenticated with a bearer key
#[derive(Clone)]
pub struct OpenAiBatchClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiBatchClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("batchpipe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Create from loaded configuration; requires `OPENAI_API_KEY`
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let key = config.require_api_key()?;
        Ok(Self::new(&config.api_base_url, key, config.api_timeout_secs)?)
    }
}

/// Turn a non-2xx response into [`ApiError::Status`] with the upstream message
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.trim().to_string()
            }
        });
    Err(ApiError::status(status.as_u16(), message))
}

#[async_trait]
impl InferenceApi for OpenAiBatchClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_artifact(&self, filename: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
        let url = endpoints::files_url(&self.base_url);
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/jsonl")
            .map_err(|e| ApiError::Config(e.to_string()))?;
        let form = multipart::Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let file: FileObject = check(response).await?.json().await?;

        debug!(file_id = %file.id, "Uploaded artifact");
        Ok(file.id)
    }

    #[instrument(skip(self, request), fields(input = %request.input_artifact_id))]
    async fn create_job(&self, request: &JobRequest) -> Result<RemoteJob, ApiError> {
        let url = endpoints::batches_url(&self.base_url);
        let mut metadata = request.metadata.clone();
        metadata
            .entry("model".to_string())
            .or_insert_with(|| request.model.clone());

        let body = CreateBatchRequest {
            input_file_id: request.input_artifact_id.clone(),
            endpoint: request.endpoint.clone(),
            completion_window: request.completion_window.clone(),
            metadata,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let batch: BatchObject = check(response).await?.json().await?;

        debug!(job_id = %batch.id, status = %batch.status, "Created batch job");
        Ok(batch.into())
    }

    async fn get_job(&self, job_id: &str) -> Result<RemoteJob, ApiError> {
        let url = endpoints::batch_url(&self.base_url, job_id);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        let batch: BatchObject = check(response).await?.json().await?;
        Ok(batch.into())
    }

    #[instrument(skip(self))]
    async fn download_artifact(&self, artifact_id: &str) -> Result<Vec<u8>, ApiError> {
        let url = endpoints::file_content_url(&self.base_url, artifact_id);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        let bytes = check(response).await?.bytes().await?.to_vec();
        debug!(bytes = bytes.len(), "Downloaded artifact");
        Ok(bytes)
    }
}
