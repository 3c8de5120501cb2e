//! API endpoint URL builders
//!
//! Paths of the OpenAI-compatible files and batches API, relative to a base
//! URL that already includes the version prefix (e.g. `.../v1`).

/// Build file upload URL
pub fn files_url(base_url: &str) -> String {
    format!("{}/files", base_url)
}

/// Build file content download URL
pub fn file_content_url(base_url: &str, file_id: &str) -> String {
    format!("{}/files/{}/content", base_url, urlencoding::encode(file_id))
}

/// Build batch creation URL
pub fn batches_url(base_url: &str) -> String {
    format!("{}/batches", base_url)
}

/// Build batch details URL
pub fn batch_url(base_url: &str, batch_id: &str) -> String {
    format!("{}/batches/{}", base_url, urlencoding::encode(batch_id))
}
