//! Error types for record extraction and packaging

use thiserror::Error;

/// Errors from a data source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Transport, auth or throttling failure talking to the source.
    /// Not retried inside the fetcher; the caller decides.
    #[error("Data source unavailable for table '{table}': {message}")]
    Unavailable { table: String, message: String },

    /// A single record lacked a usable timestamp attribute
    #[error("Record '{id}' in table '{table}' has no usable timestamp")]
    Schema { table: String, id: String },

    #[error("Malformed data in table '{table}': {message}")]
    Malformed { table: String, message: String },
}

impl SourceError {
    pub fn unavailable(table: impl Into<String>, message: impl ToString) -> Self {
        Self::Unavailable {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(table: impl Into<String>, message: impl ToString) -> Self {
        Self::Malformed {
            table: table.into(),
            message: message.to_string(),
        }
    }
}

/// Errors from building or reading a submission artifact
#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("Duplicate custom_id '{custom_id}' (records '{first}' and '{second}')")]
    DuplicateIdentifier {
        custom_id: String,
        first: String,
        second: String,
    },

    #[error("Failed to serialize artifact: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Artifact IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact file error: {0}")]
    Common(#[from] batchpipe_common::CommonError),
}
