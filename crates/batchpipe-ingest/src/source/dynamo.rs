//! DynamoDB table scan source

use super::{PageCursor, RecordPage, RecordSource};
use crate::error::SourceError;
use crate::record::SourceRecord;
use async_trait::async_trait;
use aws_sdk_dynamodb::{config::Region, error::DisplayErrorContext, types::AttributeValue, Client};
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Connection settings for [`DynamoSource`]
#[derive(Debug, Clone)]
pub struct DynamoConfig {
    pub region: String,
    /// Override for DynamoDB Local or a VPC endpoint
    pub endpoint: Option<String>,
    /// Items per scan request; `None` lets DynamoDB decide (1 MB pages)
    pub page_size: Option<i32>,
}

impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            page_size: None,
        }
    }
}

/// Scans whole tables page by page
///
/// No filter expression is sent: timestamp attribute names and encodings
/// differ per table, so filtering happens client-side in the fetcher.
#[derive(Clone)]
pub struct DynamoSource {
    client: Client,
    page_size: Option<i32>,
}

impl DynamoSource {
    pub async fn new(config: DynamoConfig) -> Self {
        debug!("Initializing DynamoDB source with config: {:?}", config);

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        info!(region = %config.region, "DynamoDB source initialized");

        Self {
            client: Client::new(&shared),
            page_size: config.page_size,
        }
    }
}

#[async_trait]
impl RecordSource for DynamoSource {
    #[instrument(skip(self, cursor))]
    async fn query_page(
        &self,
        table: &str,
        _since: Option<DateTime<Utc>>,
        cursor: Option<PageCursor>,
    ) -> Result<RecordPage, SourceError> {
        let start_key = match cursor {
            None => None,
            Some(PageCursor::Key(key)) => Some(key),
            Some(other) => {
                return Err(SourceError::malformed(
                    table,
                    format!("unsupported cursor for DynamoDB scan: {other:?}"),
                ))
            },
        };

        let mut request = self
            .client
            .scan()
            .table_name(table)
            .set_exclusive_start_key(start_key);
        if let Some(limit) = self.page_size {
            request = request.limit(limit);
        }

        let output = request
            .send()
            .await
            .map_err(|e| SourceError::unavailable(table, DisplayErrorContext(&e)))?;

        let records: Vec<SourceRecord> = output
            .items()
            .iter()
            .map(|item| SourceRecord::from_fields(item_to_json(item)))
            .collect();

        let next = output
            .last_evaluated_key()
            .filter(|key| !key.is_empty())
            .cloned()
            .map(PageCursor::Key);

        debug!(
            table,
            items = records.len(),
            more = next.is_some(),
            "Scanned DynamoDB page"
        );

        Ok(RecordPage { records, next })
    }
}

/// Convert a DynamoDB item into a JSON object
pub fn item_to_json(item: &HashMap<String, AttributeValue>) -> Map<String, Value> {
    item.iter()
        .map(|(key, value)| (key.clone(), attribute_to_json(value)))
        .collect()
}

/// Convert one attribute value. Binary attributes become `null`.
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(items) => Value::Array(items.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => Value::Object(item_to_json(map)),
        AttributeValue::Ss(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| number_to_json(n)).collect()),
        _ => Value::Null,
    }
}

fn number_to_json(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_conversion() {
        assert_eq!(attribute_to_json(&AttributeValue::S("a".into())), json!("a"));
        assert_eq!(attribute_to_json(&AttributeValue::N("42".into())), json!(42));
        assert_eq!(attribute_to_json(&AttributeValue::N("1.5".into())), json!(1.5));
        assert_eq!(attribute_to_json(&AttributeValue::Bool(true)), json!(true));
        assert_eq!(attribute_to_json(&AttributeValue::Null(true)), json!(null));
    }

    #[test]
    fn test_huge_number_kept_as_text() {
        let raw = "1".repeat(400);
        assert_eq!(attribute_to_json(&AttributeValue::N(raw.clone())), json!(raw));
    }

    #[test]
    fn test_nested_item_becomes_record() {
        let mut inner = HashMap::new();
        inner.insert("score".to_string(), AttributeValue::N("3".into()));

        let mut item = HashMap::new();
        item.insert("id".to_string(), AttributeValue::S("row-1".into()));
        item.insert("timestamp".to_string(), AttributeValue::N("1747689600".into()));
        item.insert("meta".to_string(), AttributeValue::M(inner));
        item.insert(
            "tags".to_string(),
            AttributeValue::Ss(vec!["a".into(), "b".into()]),
        );

        let record = SourceRecord::from_fields(item_to_json(&item));
        assert_eq!(record.id, "row-1");
        assert_eq!(record.timestamp, DateTime::from_timestamp(1_747_689_600, 0));
        assert_eq!(record.fields["meta"], json!({"score": 3}));
        assert_eq!(record.fields["tags"], json!(["a", "b"]));
    }
}
