//! batchpipe Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! The extract half of the pipeline: read rows from a data source, keep the
//! ones newer than a table's watermark, and package them into a submission
//! artifact for a batch-inference job.
//!
//! # Supported Data Sources
//!
//! - **DynamoDB**: paginated table scans ([`source::DynamoSource`])
//! - **JSONL exports**: one file per table ([`source::FileSource`])
//! - **In-memory**: tests and embedding ([`source::MemorySource`])
//!
//! # Example
//!
//! ```no_run
//! use batchpipe_ingest::extract::FieldCandidates;
//! use batchpipe_ingest::fetcher::{fetch_records, FetchRequest};
//! use batchpipe_ingest::packager::{encode_artifact, package_records, RequestTemplate};
//! use batchpipe_ingest::source::FileSource;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = FileSource::new("./exports");
//!     let now = chrono::Utc::now();
//!     let request = FetchRequest::new("news", chrono::DateTime::<chrono::Utc>::UNIX_EPOCH, now)
//!         .with_lookback_hours(12);
//!     let fetched = fetch_records(&source, &request).await?;
//!
//!     let template = RequestTemplate::new("gpt-4.1-nano-2025-04-14");
//!     let packaged =
//!         package_records("news", &fetched.records, &FieldCandidates::default(), &template)?;
//!     let bytes = encode_artifact(&packaged.entries, &template.endpoint)?;
//!     println!("{} bytes, {} skipped", bytes.len(), packaged.skipped.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod extract;
pub mod fetcher;
pub mod packager;
pub mod record;
pub mod source;
pub mod timestamp;

pub use error::{PackagingError, SourceError};
pub use extract::{ExtractionRule, FieldCandidates, RuleSet, Transform};
pub use fetcher::{fetch_records, FetchOutcome, FetchRequest};
pub use packager::{PackageOutcome, PromptEntry, RequestTemplate};
pub use record::SourceRecord;
pub use source::{PageCursor, RecordPage, RecordSource};
