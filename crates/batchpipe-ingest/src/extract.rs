//! Per-table text extraction rules
//!
//! A rule turns a [`SourceRecord`] into the text sent to the model, or
//! `None` when the row has nothing usable. The stock rule is
//! [`FieldCandidates`]: an ordered list of attribute names where the first
//! present, non-empty value wins.

use crate::record::SourceRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Broad candidate list covering news, social, trends and market tables
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "summary",
    "text",
    "content",
    "review_summary",
    "review_text",
    "description",
    "body",
    "article",
    "title",
    "headline",
    "selftext",
    "query",
    "keyword",
    "term",
    "trend_name",
    "trend_breakdown",
    "company",
    "symbol",
    // search trend tables
    "percent_increase",
    "search_volume",
    "source_page",
    "started_time_ago",
    // market data tables
    "avgvolume30",
    "bollingerlo",
    "bollingerup",
    "changepct",
    "changepctstr",
    "highprice",
    "lastprice",
    "lastpricetime",
    "lastupdated",
    "lastvolume",
    "lowprice",
    "prevclose",
    "rsi14",
    "sma20",
    "week52high",
    "week52low",
];

/// Article-shaped tables: prefer the long-form body over the headline
pub const NEWS_CANDIDATES: &[&str] = &[
    "summary",
    "content",
    "body",
    "article",
    "description",
    "text",
    "title",
    "headline",
];

/// Turns a record into prompt text
pub trait ExtractionRule: Send + Sync {
    fn extract(&self, record: &SourceRecord) -> Option<String>;
}

/// Post-processing applied to the winning value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Collapse runs of whitespace to a single space
    CollapseWhitespace,
    /// Keep at most this many characters
    MaxChars(usize),
}

impl Transform {
    fn apply(self, text: String) -> String {
        match self {
            Transform::CollapseWhitespace => text.split_whitespace().collect::<Vec<_>>().join(" "),
            Transform::MaxChars(max) => match text.char_indices().nth(max) {
                Some((cut, _)) => text[..cut].trim_end().to_string(),
                None => text,
            },
        }
    }
}

/// Ordered candidate attribute names plus an optional transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidates {
    pub fields: Vec<String>,
    #[serde(default)]
    pub transform: Option<Transform>,
}

impl FieldCandidates {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Built-in rule by name: `default` or `news`
    pub fn template(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "news" => Some(Self::new(NEWS_CANDIDATES.iter().copied())),
            _ => None,
        }
    }
}

impl Default for FieldCandidates {
    fn default() -> Self {
        Self::new(DEFAULT_CANDIDATES.iter().copied())
    }
}

impl ExtractionRule for FieldCandidates {
    fn extract(&self, record: &SourceRecord) -> Option<String> {
        let text = self
            .fields
            .iter()
            .filter_map(|name| record.field(name))
            .find_map(value_text)?;

        let text = match self.transform {
            Some(transform) => transform.apply(text),
            None => text,
        };
        (!text.is_empty()).then_some(text)
    }
}

/// Render a JSON value as prompt text; `None` for null and empty values
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        },
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        Value::Null => None,
    }
}

/// Extraction rule per table, with a fallback for unlisted tables
#[derive(Clone)]
pub struct RuleSet {
    default: Arc<dyn ExtractionRule>,
    tables: HashMap<String, Arc<dyn ExtractionRule>>,
}

impl RuleSet {
    pub fn new(default: impl ExtractionRule + 'static) -> Self {
        Self {
            default: Arc::new(default),
            tables: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, table: impl Into<String>, rule: impl ExtractionRule + 'static) -> Self {
        self.tables.insert(table.into(), Arc::new(rule));
        self
    }

    pub fn rule_for(&self, table: &str) -> &dyn ExtractionRule {
        self.tables
            .get(table)
            .map(Arc::as_ref)
            .unwrap_or(self.default.as_ref())
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(FieldCandidates::default())
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tables: Vec<&String> = self.tables.keys().collect();
        tables.sort();
        f.debug_struct("RuleSet").field("tables", &tables).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> SourceRecord {
        SourceRecord::from_fields(value.as_object().unwrap().clone())
    }

    #[test]
    fn test_first_non_empty_candidate_wins() {
        let rule = FieldCandidates::new(["summary", "title"]);
        let r = record(json!({"id": 1, "summary": "   ", "Title": " Rates hold "}));
        assert_eq!(rule.extract(&r).as_deref(), Some("Rates hold"));
    }

    #[test]
    fn test_no_candidate_means_skip() {
        let rule = FieldCandidates::new(["summary"]);
        assert_eq!(rule.extract(&record(json!({"id": 1, "body": "x"}))), None);
        assert_eq!(rule.extract(&record(json!({"id": 1, "summary": null}))), None);
    }

    #[test]
    fn test_numbers_and_structures_render_as_text() {
        let rule = FieldCandidates::default();
        let r = record(json!({"id": 1, "percent_increase": 250}));
        assert_eq!(rule.extract(&r).as_deref(), Some("250"));

        let r = record(json!({"id": 1, "trend_breakdown": ["fed", "cpi"]}));
        assert_eq!(rule.extract(&r).as_deref(), Some(r#"["fed","cpi"]"#));

        let r = record(json!({"id": 1, "trend_breakdown": []}));
        assert_eq!(rule.extract(&r), None);
    }

    #[test]
    fn test_transforms() {
        let r = record(json!({"id": 1, "body": "alpha   beta\n\ngamma"}));
        let collapse = FieldCandidates::new(["body"]).with_transform(Transform::CollapseWhitespace);
        assert_eq!(collapse.extract(&r).as_deref(), Some("alpha beta gamma"));

        let clip = FieldCandidates::new(["body"]).with_transform(Transform::MaxChars(5));
        assert_eq!(clip.extract(&r).as_deref(), Some("alpha"));

        let r = record(json!({"id": 1, "body": "héllo wörld"}));
        let clip = FieldCandidates::new(["body"]).with_transform(Transform::MaxChars(7));
        assert_eq!(clip.extract(&r).as_deref(), Some("héllo w"));
    }

    #[test]
    fn test_rule_set_selects_per_table() {
        let rules = RuleSet::default().with_rule("prices", FieldCandidates::new(["lastprice"]));
        let r = record(json!({"id": 1, "title": "t", "lastprice": 101.5}));

        assert_eq!(rules.rule_for("prices").extract(&r).as_deref(), Some("101.5"));
        assert_eq!(rules.rule_for("news").extract(&r).as_deref(), Some("t"));
    }

    #[test]
    fn test_templates() {
        assert_eq!(FieldCandidates::template("default"), Some(FieldCandidates::default()));
        assert_eq!(FieldCandidates::template("news").unwrap().fields[0], "summary");
        assert!(FieldCandidates::template("nope").is_none());
    }
}
