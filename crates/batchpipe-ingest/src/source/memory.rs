//! In-process source for tests and embedding

use super::{PageCursor, RecordPage, RecordSource};
use crate::error::SourceError;
use crate::record::SourceRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Tables held in memory, paged by offset
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: RwLock<HashMap<String, Vec<SourceRecord>>>,
    page_size: usize,
    unavailable: AtomicBool,
}

impl MemorySource {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            ..Self::default()
        }
    }

    /// Append rows (JSON objects) to a table; non-objects are ignored
    pub fn insert_rows(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let records = rows.into_iter().filter_map(|row| match row {
            Value::Object(fields) => Some(SourceRecord::from_fields(fields)),
            _ => None,
        });
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(table.to_string()).or_default().extend(records);
        }
    }

    /// Make every subsequent query fail with `SourceError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn query_page(
        &self,
        table: &str,
        _since: Option<DateTime<Utc>>,
        cursor: Option<PageCursor>,
    ) -> Result<RecordPage, SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable(table, "source marked unavailable"));
        }

        let offset = match cursor {
            None => 0,
            Some(PageCursor::Offset(offset)) => offset,
            Some(other) => {
                return Err(SourceError::malformed(table, format!("unsupported cursor: {other:?}")))
            },
        };

        let tables = self
            .tables
            .read()
            .map_err(|_| SourceError::unavailable(table, "table lock poisoned"))?;
        let rows = tables.get(table).map(Vec::as_slice).unwrap_or_default();

        let page_size = self.page_size.max(1);
        let end = (offset + page_size).min(rows.len());
        let records = rows.get(offset..end).unwrap_or_default().to_vec();
        let next = (end < rows.len()).then_some(PageCursor::Offset(end));
        Ok(RecordPage { records, next })
    }
}
