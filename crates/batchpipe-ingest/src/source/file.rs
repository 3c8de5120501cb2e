//! Local JSONL export source
//!
//! Reads `<root>/<table>.jsonl`, one JSON object per line. Used for local
//! runs against table exports and by the CLI integration tests.

use super::{PageCursor, RecordPage, RecordSource};
use crate::error::SourceError;
use crate::record::SourceRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
    page_size: usize,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.jsonl"))
    }
}

#[async_trait]
impl RecordSource for FileSource {
    async fn query_page(
        &self,
        table: &str,
        _since: Option<DateTime<Utc>>,
        cursor: Option<PageCursor>,
    ) -> Result<RecordPage, SourceError> {
        let offset = match cursor {
            None => 0,
            Some(PageCursor::Offset(offset)) => offset,
            Some(other) => {
                return Err(SourceError::malformed(
                    table,
                    format!("unsupported cursor for file source: {other:?}"),
                ))
            },
        };

        let path = self.table_path(table);
        let rows = tokio::task::spawn_blocking(move || read_rows(&path))
            .await
            .map_err(|e| SourceError::unavailable(table, e))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidData => SourceError::malformed(table, e),
                _ => SourceError::unavailable(table, e),
            })?;

        let total = rows.len();
        let end = (offset + self.page_size).min(total);
        let records: Vec<SourceRecord> = rows
            .into_iter()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .map(SourceRecord::from_fields)
            .collect();
        let next = (end < total).then_some(PageCursor::Offset(end));

        debug!(table, offset, rows = records.len(), "Read file source page");
        Ok(RecordPage { records, next })
    }
}

fn read_rows(path: &Path) -> std::io::Result<Vec<Map<String, Value>>> {
    serde_jsonlines::json_lines::<Map<String, Value>, _>(path)?.collect()
}
