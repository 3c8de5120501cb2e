//! Per-table high-water-mark store
//!
//! One JSON document per table: `{watermark_dir}/{table}.json` holding
//! `{table, last_timestamp}`. Writes replace the file atomically, so a
//! concurrent `resume` reading the same table sees either value.

use super::{file_error, state_file_name};
use crate::error::StoreError;
use batchpipe_common::fs::{read_json_opt, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Persisted cursor for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub table: String,
    pub last_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WatermarkStore {
    dir: PathBuf,
}

impl WatermarkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.json", state_file_name(table)))
    }

    /// Last processed timestamp; epoch zero when the table has never run
    pub fn get(&self, table: &str) -> Result<DateTime<Utc>, StoreError> {
        let path = self.path_for(table);
        let stored: Option<Watermark> = read_json_opt(&path).map_err(|e| file_error(&path, e))?;
        Ok(stored
            .map(|w| w.last_timestamp)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }

    /// Advance the watermark to `timestamp`
    ///
    /// Never moves backward: an older value leaves the stored one in place.
    /// Returns the value now on disk.
    pub fn set(&self, table: &str, timestamp: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError> {
        let current = self.get(table)?;
        if timestamp <= current {
            debug!(table, current = %current, requested = %timestamp, "Watermark not advanced");
            return Ok(current);
        }

        let path = self.path_for(table);
        let watermark = Watermark {
            table: table.to_string(),
            last_timestamp: timestamp,
        };
        write_json_atomic(&path, &watermark).map_err(|e| file_error(&path, e))?;

        info!(table, from = %current, to = %timestamp, "Watermark advanced");
        Ok(timestamp)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_absent_table_is_epoch() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path());
        assert_eq!(store.get("news").unwrap(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_set_and_get() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path().join("watermarks"));
        store.set("news", at(1_747_689_600)).unwrap();
        assert_eq!(store.get("news").unwrap(), at(1_747_689_600));
        assert_eq!(store.get("prices").unwrap(), DateTime::<Utc>::UNIX_EPOCH);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path_for("news")).unwrap()).unwrap();
        assert_eq!(raw["table"], "news");
    }

    #[test]
    fn test_never_moves_backward() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path());
        store.set("news", at(200)).unwrap();
        assert_eq!(store.set("news", at(100)).unwrap(), at(200));
        assert_eq!(store.get("news").unwrap(), at(200));
        assert_eq!(store.set("news", at(300)).unwrap(), at(300));
    }

    #[test]
    fn test_similar_table_names_keep_separate_watermarks() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path());
        store.set("news feed", at(100)).unwrap();
        store.set("news_feed", at(200)).unwrap();
        assert_eq!(store.get("news feed").unwrap(), at(100));
        assert_eq!(store.get("news_feed").unwrap(), at(200));
        assert_ne!(store.path_for("news feed"), store.path_for("news_feed"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path());
        std::fs::write(store.path_for("news"), b"{not json").unwrap();
        assert!(matches!(store.get("news"), Err(StoreError::File { .. })));
    }
}
