//! Durable pipeline state
//!
//! Watermarks and job records are the only state that outlives a run. Both
//! are plain JSON files under the state directory, replaced atomically.

pub mod jobs;
pub mod mirror;
pub mod watermark;

pub use jobs::JobStore;
pub use mirror::JobMirror;
pub use watermark::{Watermark, WatermarkStore};

use crate::error::StoreError;
use batchpipe_common::checksum::sha256_hex;
use batchpipe_common::CommonError;
use std::path::Path;

pub(crate) fn file_error(path: &Path, source: CommonError) -> StoreError {
    StoreError::File {
        path: path.display().to_string(),
        source,
    }
}

/// File-name-safe form of a table name or job id
///
/// Keys that needed rewriting get a short digest of the original appended,
/// so `news feed` and `news_feed` never share a file.
pub(crate) fn state_file_name(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe == key && !key.starts_with('.') {
        return safe;
    }
    format!("{safe}-{}", &sha256_hex(key.as_bytes())[..8])
}
