//! Prompt packaging and the submission artifact format
//!
//! Each surviving record becomes one [`PromptEntry`]; the artifact is the
//! entries as JSON lines `{custom_id, method, url, body}` in input order.
//! Output is a pure function of the records and the template, so the same
//! input always yields byte-identical bytes.

use crate::error::PackagingError;
use crate::extract::ExtractionRule;
use crate::record::SourceRecord;
use batchpipe_common::checksum::sha256_hex;
use batchpipe_common::fs::{unique_path, write_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_jsonlines::{BufReadExt, WriteExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_ENDPOINT: &str = "/v1/chat/completions";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a senior macroeconomic intelligence analyst. \
Your job is to clean, verify, and standardize incoming real-time macro and market data into a \
structured intelligence report.\n\n\
The input may include Reddit sentiment summaries, Google Trends spikes, news headlines, and live \
market prices.\n\n\
Transform this raw data into a clean, verified, and structured intelligence report in JSON format \
for later use in batch analytics and dashboards.\n";

/// Longest custom_id kept verbatim
const MAX_CUSTOM_ID_LEN: usize = 64;
const HASHED_PREFIX_LEN: usize = 47;

/// Request settings shared by every entry in one artifact
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub model: String,
    pub system_prompt: String,
    pub endpoint: String,
}

impl RequestTemplate {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Source record id, echoed back for traceability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// One submission-ready request
#[derive(Debug, Clone, PartialEq)]
pub struct PromptEntry {
    pub custom_id: String,
    pub record_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: ChatRequest,
}

/// One line of the artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLine<B = serde_json::Value> {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: B,
}

#[derive(Serialize)]
struct ArtifactLineRef<'a> {
    custom_id: &'a str,
    method: &'a str,
    url: &'a str,
    body: &'a ChatRequest,
}

/// Result of packaging one fetch
#[derive(Debug, Default)]
pub struct PackageOutcome {
    pub entries: Vec<PromptEntry>,
    /// Ids of records with no extractable text
    pub skipped: Vec<String>,
}

impl PackageOutcome {
    /// Newest timestamp among packaged entries
    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().filter_map(|e| e.timestamp).max()
    }
}

/// Derive the artifact-level id for a record id
///
/// Characters outside `[A-Za-z0-9_.:-]` become `_`. Ids longer than 64
/// characters keep a readable prefix plus a hash of the full id.
pub fn custom_id_for(record_id: &str) -> String {
    let sanitized: String = record_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.len() <= MAX_CUSTOM_ID_LEN {
        return sanitized;
    }
    let digest = sha256_hex(record_id.as_bytes());
    format!("{}-{}", &sanitized[..HASHED_PREFIX_LEN], &digest[..16])
}

/// Build entries for `records` in order using `rule`
pub fn package_records(
    table: &str,
    records: &[SourceRecord],
    rule: &dyn ExtractionRule,
    template: &RequestTemplate,
) -> Result<PackageOutcome, PackagingError> {
    let mut outcome = PackageOutcome::default();
    let mut seen: HashMap<String, String> = HashMap::new();

    for record in records {
        let Some(text) = rule.extract(record) else {
            outcome.skipped.push(record.id.clone());
            continue;
        };

        let custom_id = custom_id_for(&record.id);
        if let Some(first) = seen.insert(custom_id.clone(), record.id.clone()) {
            return Err(PackagingError::DuplicateIdentifier {
                custom_id,
                first,
                second: record.id.clone(),
            });
        }

        outcome.entries.push(PromptEntry {
            custom_id,
            record_id: record.id.clone(),
            timestamp: record.timestamp,
            payload: ChatRequest {
                model: template.model.clone(),
                messages: vec![
                    ChatMessage {
                        role: "system".to_string(),
                        content: template.system_prompt.clone(),
                    },
                    ChatMessage {
                        role: "user".to_string(),
                        content: text,
                    },
                ],
                user: Some(record.id.clone()),
            },
        });
    }

    if !outcome.skipped.is_empty() {
        warn!(
            table,
            skipped = outcome.skipped.len(),
            "Records without extractable text were skipped"
        );
    }
    info!(
        table,
        entries = outcome.entries.len(),
        skipped = outcome.skipped.len(),
        "Packaged prompt entries"
    );

    Ok(outcome)
}

/// Serialize entries as the JSONL artifact
pub fn encode_artifact(entries: &[PromptEntry], endpoint: &str) -> Result<Vec<u8>, PackagingError> {
    let mut buffer = Vec::new();
    buffer.write_json_lines(entries.iter().map(|entry| ArtifactLineRef {
        custom_id: &entry.custom_id,
        method: "POST",
        url: endpoint,
        body: &entry.payload,
    }))?;
    Ok(buffer)
}

/// Parse an artifact back into its lines
pub fn decode_artifact(bytes: &[u8]) -> Result<Vec<ArtifactLine>, PackagingError> {
    Ok(bytes.json_lines::<ArtifactLine>().collect::<std::io::Result<Vec<_>>>()?)
}

/// File name stem for an artifact: `batch_<tag>_<YYYYmmdd_HHMM>`
pub fn artifact_stem(tag: &str, now: DateTime<Utc>) -> String {
    let safe_tag: String = tag
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .take(32)
        .collect();
    format!("batch_{}_{}", safe_tag, now.format("%Y%m%d_%H%M"))
}

/// Write artifact bytes under `dir` without overwriting earlier files
pub fn write_artifact(
    dir: &Path,
    tag: &str,
    now: DateTime<Utc>,
    bytes: &[u8],
) -> Result<PathBuf, PackagingError> {
    std::fs::create_dir_all(dir)?;
    let path = unique_path(dir, &artifact_stem(tag, now), "jsonl");
    write_atomic(&path, bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "Wrote submission artifact");
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::extract::FieldCandidates;
    use serde_json::json;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn records(rows: Vec<serde_json::Value>) -> Vec<SourceRecord> {
        rows.into_iter()
            .map(|row| SourceRecord::from_fields(row.as_object().unwrap().clone()))
            .collect()
    }

    fn template() -> RequestTemplate {
        RequestTemplate::new("gpt-4.1-nano-2025-04-14")
    }

    #[test]
    fn test_three_records_three_entries() {
        let input = records(vec![
            json!({"id": "a", "ts": 1, "summary": "one"}),
            json!({"id": "b", "ts": 2, "summary": "two"}),
            json!({"id": "c", "ts": 3, "summary": "three"}),
        ]);
        let outcome =
            package_records("news", &input, &FieldCandidates::default(), &template()).unwrap();

        assert_eq!(outcome.entries.len(), 3);
        assert!(outcome.skipped.is_empty());
        let first = &outcome.entries[0];
        assert_eq!(first.custom_id, "a");
        assert_eq!(first.payload.user.as_deref(), Some("a"));
        assert_eq!(first.payload.messages[0].role, "system");
        assert_eq!(first.payload.messages[1].content, "one");
        assert_eq!(outcome.max_timestamp(), DateTime::from_timestamp(3, 0));
    }

    #[test]
    fn test_record_without_text_is_skipped() {
        let input = records(vec![
            json!({"id": "a", "summary": "one"}),
            json!({"id": "b", "image_url": "https://x/y.png"}),
            json!({"id": "c", "summary": "three"}),
        ]);
        let outcome =
            package_records("news", &input, &FieldCandidates::default(), &template()).unwrap();

        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.skipped, vec!["b".to_string()]);
    }

    #[test]
    fn test_custom_id_collision_is_fatal() {
        let input = records(vec![
            json!({"id": "a/b", "summary": "one"}),
            json!({"id": "a b", "summary": "two"}),
        ]);
        let err = package_records("news", &input, &FieldCandidates::default(), &template())
            .unwrap_err();
        assert!(matches!(
            err,
            PackagingError::DuplicateIdentifier { ref custom_id, .. } if custom_id == "a_b"
        ));
    }

    #[test]
    fn test_custom_id_rules() {
        assert_eq!(custom_id_for("news:2025-05-19.001"), "news:2025-05-19.001");
        assert_eq!(custom_id_for("https://x.com/a?b=1"), "https:__x.com_a_b_1");

        let long = "x".repeat(100);
        let id = custom_id_for(&long);
        assert_eq!(id.len(), MAX_CUSTOM_ID_LEN);
        assert!(id.starts_with(&"x".repeat(HASHED_PREFIX_LEN)));
        assert_ne!(id, custom_id_for(&"x".repeat(101)));
    }

    #[test]
    fn test_artifact_is_deterministic_and_recovers_ids() {
        let input = records(
            (0..20)
                .map(|i| json!({"id": format!("r{i}"), "ts": i, "text": format!("row {i}")}))
                .collect(),
        );
        let rule = FieldCandidates::default();
        let first = package_records("t", &input, &rule, &template()).unwrap();
        let second = package_records("t", &input, &rule, &template()).unwrap();

        let bytes = encode_artifact(&first.entries, DEFAULT_ENDPOINT).unwrap();
        assert_eq!(bytes, encode_artifact(&second.entries, DEFAULT_ENDPOINT).unwrap());

        let lines = decode_artifact(&bytes).unwrap();
        assert_eq!(lines.len(), 20);
        let ids: HashSet<&str> = lines.iter().map(|l| l.custom_id.as_str()).collect();
        let expected: HashSet<&str> = first.entries.iter().map(|e| e.custom_id.as_str()).collect();
        assert_eq!(ids, expected);
        assert_eq!(lines[0].method, "POST");
        assert_eq!(lines[0].url, DEFAULT_ENDPOINT);
        assert_eq!(lines[0].body["user"], json!("r0"));
    }

    #[test]
    fn test_artifact_line_shape() {
        let input = records(vec![json!({"id": 7, "summary": "s"})]);
        let outcome =
            package_records("t", &input, &FieldCandidates::default(), &template()).unwrap();
        let bytes = encode_artifact(&outcome.entries, "/v1/chat/completions").unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.ends_with('\n'));
        assert!(text.starts_with(r#"{"custom_id":"7","method":"POST","url":"/v1/chat/completions","body":{"model":"gpt-4.1-nano-2025-04-14""#));
    }

    #[test]
    fn test_write_artifact_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let now = DateTime::from_timestamp(1_747_689_600, 0).unwrap();

        let a = write_artifact(dir.path(), "market news!", now, b"a\n").unwrap();
        let b = write_artifact(dir.path(), "market news!", now, b"b\n").unwrap();

        assert_eq!(a.file_name().unwrap(), "batch_market-news-_20250519_2120.jsonl");
        assert_eq!(b.file_name().unwrap(), "batch_market-news-_20250519_2120_1.jsonl");
        assert_eq!(std::fs::read(&a).unwrap(), b"a\n");
    }
}
