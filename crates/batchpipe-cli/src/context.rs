//! Per-run pipeline context
//!
//! Built once at startup and handed to every stage. Nothing in the crate
//! holds clients in globals; the context owns them for the run.

use crate::api::{InferenceApi, OpenAiBatchClient};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, SourceKind};
use crate::error::{BatchError, Result};
use crate::monitor::{JobMonitor, PollConfig};
use crate::retriever::ResultRetriever;
use crate::store::{JobMirror, JobStore, WatermarkStore};
use batchpipe_ingest::source::{DynamoConfig, DynamoSource, FileSource, RecordSource};
use batchpipe_ingest::RuleSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct PipelineContext {
    pub config: Config,
    pub source: Arc<dyn RecordSource>,
    /// `None` when no API key is configured (dry runs)
    pub api: Option<Arc<dyn InferenceApi>>,
    pub rules: RuleSet,
    pub watermarks: WatermarkStore,
    pub jobs: JobStore,
    pub mirror: JobMirror,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancellationToken,
}

impl PipelineContext {
    /// Wire up real collaborators from configuration
    ///
    /// With `require_api` the API key must be present; otherwise a missing
    /// key leaves `api` empty.
    pub async fn from_config(config: Config, require_api: bool, cancel: CancellationToken) -> Result<Self> {
        let api: Option<Arc<dyn InferenceApi>> = match (&config.api_key, require_api) {
            (Some(_), _) => Some(Arc::new(OpenAiBatchClient::from_config(&config)?)),
            (None, true) => return Err(BatchError::config("OPENAI_API_KEY is not set")),
            (None, false) => None,
        };

        let source: Arc<dyn RecordSource> = match config.source {
            SourceKind::Dynamodb => Arc::new(
                DynamoSource::new(DynamoConfig {
                    region: config.aws_region.clone(),
                    endpoint: config.dynamodb_endpoint.clone(),
                    page_size: None,
                })
                .await,
            ),
            SourceKind::File => Arc::new(FileSource::new(config.source_dir.clone())),
        };

        let mirror = JobMirror::connect(
            config.job_table.as_deref(),
            &config.aws_region,
            config.dynamodb_endpoint.as_deref(),
        )
        .await;

        Self::builder(config, source)
            .api(api)
            .mirror(mirror)
            .cancel(cancel)
            .build()
    }

    /// Assemble a context from explicit collaborators
    pub fn builder(config: Config, source: Arc<dyn RecordSource>) -> PipelineContextBuilder {
        PipelineContextBuilder {
            config,
            source,
            api: None,
            mirror: JobMirror::disabled(),
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    pub fn api(&self) -> Result<&dyn InferenceApi> {
        self.api
            .as_deref()
            .ok_or_else(|| BatchError::config("OPENAI_API_KEY is not set"))
    }

    pub fn monitor(&self) -> Result<JobMonitor<'_>> {
        Ok(JobMonitor::new(
            self.api()?,
            &self.jobs,
            &self.mirror,
            self.clock.as_ref(),
            PollConfig::from(self.config.poll),
        ))
    }

    pub fn retriever(&self) -> Result<ResultRetriever<'_>> {
        Ok(ResultRetriever::new(
            self.api()?,
            &self.jobs,
            &self.mirror,
            self.clock.as_ref(),
            &self.config.output_dir,
        ))
    }
}

pub struct PipelineContextBuilder {
    config: Config,
    source: Arc<dyn RecordSource>,
    api: Option<Arc<dyn InferenceApi>>,
    mirror: JobMirror,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl PipelineContextBuilder {
    pub fn api(mut self, api: Option<Arc<dyn InferenceApi>>) -> Self {
        self.api = api;
        self
    }

    pub fn mirror(mut self, mirror: JobMirror) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<PipelineContext> {
        let rules = self.config.project.rule_set()?;
        let watermarks = WatermarkStore::new(self.config.watermark_dir());
        let jobs = JobStore::new(self.config.jobs_dir());
        debug!(state_dir = %self.config.state_dir.display(), "Pipeline context ready");

        Ok(PipelineContext {
            config: self.config,
            source: self.source,
            api: self.api,
            rules,
            watermarks,
            jobs,
            mirror: self.mirror,
            clock: self.clock,
            cancel: self.cancel,
        })
    }
}
