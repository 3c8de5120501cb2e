//! Best-effort DynamoDB copy of job records
//!
//! Enabled by `BATCHPIPE_JOB_TABLE`. The local JSON record stays the source
//! of truth; mirror failures are logged and never fail the run.

use crate::job::BatchJob;
use aws_sdk_dynamodb::{config::Region, error::DisplayErrorContext, types::AttributeValue, Client};
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Clone, Default)]
pub struct JobMirror {
    target: Option<(Client, String)>,
}

impl JobMirror {
    /// Mirror that does nothing
    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            target: Some((client, table.into())),
        }
    }

    /// Build from region/endpoint settings; `None` table disables mirroring
    pub async fn connect(table: Option<&str>, region: &str, endpoint: Option<&str>) -> Self {
        let Some(table) = table else {
            return Self::disabled();
        };

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()));
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        info!(table, region, "Job records mirrored to DynamoDB");
        Self::new(Client::new(&shared), table)
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Put the record; errors are logged only
    pub async fn record(&self, job: &BatchJob) {
        let Some((client, table)) = &self.target else {
            return;
        };

        let result = client
            .put_item()
            .table_name(table)
            .set_item(Some(job_to_item(job)))
            .send()
            .await;

        match result {
            Ok(_) => debug!(job_id = %job.job_id, table = %table, "Job record mirrored"),
            Err(err) => warn!(
                job_id = %job.job_id,
                table = %table,
                error = %DisplayErrorContext(&err),
                "Failed to mirror job record"
            ),
        }
    }
}

impl std::fmt::Debug for JobMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobMirror")
            .field("table", &self.target.as_ref().map(|(_, t)| t))
            .finish()
    }
}

fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

/// DynamoDB item for a job record, keyed by `batch_id`
pub fn job_to_item(job: &BatchJob) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("batch_id".to_string(), s(&job.job_id));
    item.insert("table_name".to_string(), s(&job.table));
    item.insert("status".to_string(), s(job.status.as_str()));
    item.insert("model".to_string(), s(&job.model));
    item.insert("record_count".to_string(), AttributeValue::N(job.record_count.to_string()));
    item.insert("input_file_id".to_string(), s(&job.input_artifact_ref));
    item.insert("created_at".to_string(), s(job.created_at.to_rfc3339()));

    let optional = [
        ("output_file_id", job.output_artifact_ref.clone()),
        ("error_file_id", job.error_artifact_ref.clone()),
        (
            "input_file_name",
            job.input_artifact_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
        ),
        ("output_path", job.output_path.as_ref().map(|p| p.display().to_string())),
        ("error_path", job.error_path.as_ref().map(|p| p.display().to_string())),
        ("last_polled_at", job.last_polled_at.map(|t| t.to_rfc3339())),
        ("downloaded_at", job.downloaded_at.map(|t| t.to_rfc3339())),
        ("final_status", job.final_status.map(|s| s.as_str().to_string())),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            item.insert(key.to_string(), s(value));
        }
    }
    item
}
