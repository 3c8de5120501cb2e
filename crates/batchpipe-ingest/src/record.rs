//! Raw rows read from a data source

use crate::timestamp::find_timestamp;
use batchpipe_common::checksum::sha256_hex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute names holding the primary identifier, in priority order
pub const ID_KEYS: &[&str] = &["id", "pk", "record_id", "article_id"];

/// Attribute names holding a canonical URL, in priority order
pub const URL_KEYS: &[&str] = &["url", "link", "source_url", "guid"];

/// One row from a source table. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Stable identifier, unique within the table
    pub id: String,

    /// Parsed timestamp attribute, if the row has one
    pub timestamp: Option<DateTime<Utc>>,

    /// All attributes as loosely-typed JSON
    pub fields: Map<String, Value>,
}

impl SourceRecord {
    /// Build a record from a raw row, deriving identifier and timestamp
    ///
    /// The identifier comes from the first ID key present, then the first
    /// URL key. Rows with neither get a content hash so they are still
    /// addressable.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        let id = first_scalar(&fields, ID_KEYS)
            .or_else(|| first_scalar(&fields, URL_KEYS))
            .unwrap_or_else(|| content_id(&fields));
        let timestamp = find_timestamp(&fields);

        Self {
            id,
            timestamp,
            fields,
        }
    }

    /// Look up an attribute ignoring ASCII case
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).or_else(|| {
            self.fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    /// Key used to collapse re-ingested copies of the same row
    ///
    /// Crawled tables often store one article under several ids; the URL is
    /// the better identity when present.
    pub fn dedup_key(&self) -> String {
        URL_KEYS
            .iter()
            .filter_map(|key| self.field(key))
            .find_map(|value| match value {
                Value::String(s) if !s.trim().is_empty() => {
                    Some(format!("url:{}", s.trim().to_lowercase()))
                },
                _ => None,
            })
            .unwrap_or_else(|| format!("id:{}", self.id))
    }
}

fn first_scalar(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let value = fields.get(*key).or_else(|| {
            fields
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })?;
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

fn content_id(fields: &Map<String, Value>) -> String {
    // serde_json::Map is ordered by key, so this is canonical
    let canonical = Value::Object(fields.clone()).to_string();
    format!("sha256-{}", &sha256_hex(canonical.as_bytes())[..32])
}
