//! batchpipe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities and error handling for the batchpipe workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Checksums**: content digests used to verify downloaded artifacts
//! - **Durable files**: crash-safe write-temp-then-rename helpers
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use batchpipe_common::checksum::ContentDigest;
//! use batchpipe_common::fs::write_atomic;
//!
//! fn persist(path: &std::path::Path, data: &[u8]) -> batchpipe_common::Result<ContentDigest> {
//!     write_atomic(path, data)?;
//!     Ok(ContentDigest::of(data))
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod fs;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
