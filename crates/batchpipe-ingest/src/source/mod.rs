//! Read-only data source adapters
//!
//! A [`RecordSource`] answers one question: give me a page of rows from a
//! table, optionally newer than a lower bound. Sources may use the bound to
//! narrow the scan but are not required to; the fetcher always filters again.

pub mod dynamo;
pub mod file;
pub mod memory;

use crate::error::SourceError;
use crate::record::SourceRecord;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub use dynamo::{DynamoConfig, DynamoSource};
pub use file::FileSource;
pub use memory::MemorySource;

/// Position to continue a paginated scan from
#[derive(Debug, Clone, PartialEq)]
pub enum PageCursor {
    /// DynamoDB `LastEvaluatedKey`
    Key(HashMap<String, AttributeValue>),
    /// Row offset for sources that page by position
    Offset(usize),
}

/// One page of rows
#[derive(Debug, Default)]
pub struct RecordPage {
    pub records: Vec<SourceRecord>,
    /// `None` once the scan is exhausted
    pub next: Option<PageCursor>,
}

/// Paged range query over a table
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn query_page(
        &self,
        table: &str,
        since: Option<DateTime<Utc>>,
        cursor: Option<PageCursor>,
    ) -> Result<RecordPage, SourceError>;
}
