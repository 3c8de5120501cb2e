//! Configuration management for batchpipe
//!
//! Runtime settings come from environment variables (a `.env` file is loaded
//! first by the binary). Table-level behavior lives in an optional TOML
//! project file, `batchpipe.toml` by default.

use crate::error::{BatchError, Result};
use crate::models::DEFAULT_MODEL_KEY;
use batchpipe_ingest::extract::{FieldCandidates, RuleSet, Transform};
use batchpipe_ingest::packager::{DEFAULT_ENDPOINT, DEFAULT_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// Configuration Constants
// ============================================================================

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default timeout for API requests in seconds.
/// Large result files need the headroom.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_POLL_INITIAL_SECS: u64 = 15;
pub const DEFAULT_POLL_MAX_SECS: u64 = 600;

/// 24h completion window plus two hours of slack
pub const DEFAULT_POLL_DEADLINE_SECS: u64 = 93_600;

pub const DEFAULT_COMPLETION_WINDOW: &str = "24h";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_PROJECT_FILE: &str = "batchpipe.toml";

/// Where records are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Dynamodb,
    File,
}

impl FromStr for SourceKind {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dynamodb" | "dynamo" => Ok(SourceKind::Dynamodb),
            "file" | "jsonl" => Ok(SourceKind::File),
            other => Err(BatchError::config(format!(
                "unknown source '{other}' (expected 'dynamodb' or 'file')"
            ))),
        }
    }
}

/// Poll loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub initial_secs: u64,
    pub max_secs: u64,
    pub deadline_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_secs: DEFAULT_POLL_INITIAL_SECS,
            max_secs: DEFAULT_POLL_MAX_SECS,
            deadline_secs: DEFAULT_POLL_DEADLINE_SECS,
        }
    }
}

/// Per-table overrides in `batchpipe.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    /// Built-in candidate list: `default` or `news`
    pub template: Option<String>,
    /// Explicit candidate list; wins over `template`
    pub fields: Option<Vec<String>>,
    pub transform: Option<Transform>,
    /// Static table: scanned fully, never watermarked
    pub full_scan: bool,
}

/// Contents of `batchpipe.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Tables processed when `--table` is not given
    pub enabled_tables: Vec<String>,
    pub full_scan_tables: Vec<String>,
    /// Advance the watermark past records skipped for lack of text
    pub advance_past_skipped: bool,
    pub system_prompt: Option<String>,
    /// Default character cap for tables without their own transform
    pub max_chars: Option<usize>,
    pub tables: BTreeMap<String, TableConfig>,
}

impl ProjectConfig {
    /// Parse a project file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BatchError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| BatchError::config(format!("invalid {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn is_full_scan(&self, table: &str) -> bool {
        self.full_scan_tables.iter().any(|t| t == table)
            || self.tables.get(table).is_some_and(|t| t.full_scan)
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Build the extraction rule for every configured table
    pub fn rule_set(&self) -> Result<RuleSet> {
        let default_transform = self.max_chars.map(Transform::MaxChars);
        let mut default_rule = FieldCandidates::default();
        default_rule.transform = default_transform;

        let mut rules = RuleSet::new(default_rule);
        for (table, config) in &self.tables {
            let mut rule = match (&config.fields, &config.template) {
                (Some(fields), _) => FieldCandidates::new(fields.iter().cloned()),
                (None, Some(name)) => FieldCandidates::template(name).ok_or_else(|| {
                    BatchError::config(format!("table '{table}' uses unknown template '{name}'"))
                })?,
                (None, None) => FieldCandidates::default(),
            };
            rule.transform = config.transform.or(default_transform);
            rules = rules.with_rule(table.clone(), rule);
        }
        Ok(rules)
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub api_timeout_secs: u64,

    /// Watermarks and job records
    pub state_dir: PathBuf,
    /// Downloaded job results
    pub output_dir: PathBuf,
    /// Archived submission artifacts
    pub artifact_dir: PathBuf,

    pub source: SourceKind,
    /// Root of `<table>.jsonl` files for the file source
    pub source_dir: PathBuf,
    pub aws_region: String,
    pub dynamodb_endpoint: Option<String>,

    pub poll: PollSettings,
    pub model_key: String,
    pub completion_window: String,
    pub endpoint: String,

    /// DynamoDB table mirroring job records, if any
    pub job_table: Option<String>,

    pub project: ProjectConfig,
}

impl Config {
    /// Create a config with default values
    pub fn new() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            state_dir: PathBuf::from("./.batchpipe"),
            output_dir: PathBuf::from("./output"),
            artifact_dir: PathBuf::from("./jsonl"),
            source: SourceKind::Dynamodb,
            source_dir: PathBuf::from("./data"),
            aws_region: DEFAULT_REGION.to_string(),
            dynamodb_endpoint: None,
            poll: PollSettings::default(),
            model_key: DEFAULT_MODEL_KEY.to_string(),
            completion_window: DEFAULT_COMPLETION_WINDOW.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            job_table: None,
            project: ProjectConfig::default(),
        }
    }

    /// Load config from the process environment and the project file
    pub fn from_env(project_file: Option<&Path>) -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok(), project_file)
    }

    /// Load config from an arbitrary variable lookup
    ///
    /// A missing `project_file` falls back to `./batchpipe.toml` when it
    /// exists; an explicitly named file must exist.
    pub fn from_vars<F>(lookup: F, project_file: Option<&Path>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::new();

        config.api_key = var("OPENAI_API_KEY");
        if let Some(url) = var("BATCHPIPE_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = var("BATCHPIPE_API_TIMEOUT_SECS") {
            config.api_timeout_secs = parse_number("BATCHPIPE_API_TIMEOUT_SECS", &secs)?;
        }

        if let Some(dir) = var("BATCHPIPE_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("BATCHPIPE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("BATCHPIPE_ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(dir);
        }

        if let Some(source) = var("BATCHPIPE_SOURCE") {
            config.source = source.parse()?;
        }
        if let Some(dir) = var("BATCHPIPE_SOURCE_DIR") {
            config.source_dir = PathBuf::from(dir);
        }
        if let Some(region) = var("AWS_REGION") {
            config.aws_region = region;
        }
        config.dynamodb_endpoint = var("BATCHPIPE_DYNAMODB_ENDPOINT");

        if let Some(secs) = var("BATCHPIPE_POLL_INITIAL_SECS") {
            config.poll.initial_secs = parse_number("BATCHPIPE_POLL_INITIAL_SECS", &secs)?;
        }
        if let Some(secs) = var("BATCHPIPE_POLL_MAX_SECS") {
            config.poll.max_secs = parse_number("BATCHPIPE_POLL_MAX_SECS", &secs)?;
        }
        if let Some(secs) = var("BATCHPIPE_POLL_DEADLINE_SECS") {
            config.poll.deadline_secs = parse_number("BATCHPIPE_POLL_DEADLINE_SECS", &secs)?;
        }

        if let Some(model) = var("BATCHPIPE_MODEL") {
            config.model_key = model;
        }
        if let Some(window) = var("BATCHPIPE_COMPLETION_WINDOW") {
            config.completion_window = window;
        }
        if let Some(endpoint) = var("BATCHPIPE_ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.job_table = var("BATCHPIPE_JOB_TABLE");

        let explicit = project_file
            .map(Path::to_path_buf)
            .or_else(|| var("BATCHPIPE_CONFIG").map(PathBuf::from));
        config.project = match explicit {
            Some(path) => ProjectConfig::load(&path)?,
            None if Path::new(DEFAULT_PROJECT_FILE).is_file() => {
                ProjectConfig::load(Path::new(DEFAULT_PROJECT_FILE))?
            },
            None => ProjectConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll.initial_secs == 0 {
            return Err(BatchError::config("BATCHPIPE_POLL_INITIAL_SECS must be positive"));
        }
        if self.poll.max_secs < self.poll.initial_secs {
            return Err(BatchError::config(
                "BATCHPIPE_POLL_MAX_SECS must not be below BATCHPIPE_POLL_INITIAL_SECS",
            ));
        }
        Ok(())
    }

    /// API key, or a config error naming the variable
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| BatchError::config("OPENAI_API_KEY is not set"))
    }

    /// Artifact directory for dry runs: `<artifact_dir>_test`
    pub fn dry_run_artifact_dir(&self) -> PathBuf {
        let mut name = self
            .artifact_dir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "jsonl".into());
        name.push("_test");
        self.artifact_dir.with_file_name(name)
    }

    pub fn watermark_dir(&self) -> PathBuf {
        self.state_dir.join("watermarks")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.state_dir.join("jobs")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| BatchError::config(format!("{name} must be a whole number, got '{value}'")))
}
