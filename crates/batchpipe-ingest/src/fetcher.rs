//! Incremental record fetch
//!
//! Pages through a source until exhausted, keeps only rows newer than the
//! table's watermark, collapses duplicates and returns rows ordered by
//! `(timestamp, id)`. The lookback window stands in for the watermark when
//! a table has none yet or when rewinding.

use crate::error::SourceError;
use crate::record::SourceRecord;
use crate::source::RecordSource;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// What to fetch from one table
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub table: String,
    /// Exclusive lower bound; epoch zero when the table was never submitted
    pub watermark: DateTime<Utc>,
    /// First-run and rewind lower bound: `now - lookback`
    pub lookback: Option<Duration>,
    /// Let the lookback window replace the watermark for this fetch
    pub rewind: bool,
    /// Static table: no timestamp filtering, rows without timestamps kept
    pub full_scan: bool,
    pub now: DateTime<Utc>,
}

impl FetchRequest {
    pub fn new(table: impl Into<String>, watermark: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            table: table.into(),
            watermark,
            lookback: None,
            rewind: false,
            full_scan: false,
            now,
        }
    }

    pub fn with_lookback_hours(mut self, hours: u32) -> Self {
        self.lookback = Some(Duration::hours(i64::from(hours)));
        self
    }

    pub fn rewind(mut self, rewind: bool) -> Self {
        self.rewind = rewind;
        self
    }

    pub fn full_scan(mut self, full_scan: bool) -> Self {
        self.full_scan = full_scan;
        self
    }

    fn window_start(&self) -> Option<DateTime<Utc>> {
        self.lookback.map(|lookback| self.now - lookback)
    }

    /// Lower bound on row timestamps and whether it is inclusive
    ///
    /// A recorded watermark is authoritative: the window only bounds the
    /// first fetch of a table and rewinds.
    fn lower_bound(&self) -> (DateTime<Utc>, bool) {
        match self.window_start() {
            Some(start) if self.rewind => (start, true),
            Some(start) if self.watermark == DateTime::<Utc>::UNIX_EPOCH => (start, true),
            _ => (self.watermark, false),
        }
    }

    /// Lower bound passed to the source as a scan hint
    fn hint(&self) -> Option<DateTime<Utc>> {
        if self.full_scan {
            return None;
        }
        Some(self.lower_bound().0)
    }

    fn accepts(&self, ts: DateTime<Utc>) -> bool {
        match self.lower_bound() {
            (bound, true) => ts >= bound,
            (bound, false) => ts > bound,
        }
    }
}

/// Rows returned by a fetch plus per-run counters
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<SourceRecord>,
    pub pages: usize,
    pub scanned: usize,
    /// One `SourceError::Schema` per row skipped for lacking a timestamp
    pub schema_errors: Vec<SourceError>,
    /// Rows at or below the lower bound
    pub filtered_out: usize,
    pub duplicates: usize,
}

impl FetchOutcome {
    pub fn missing_timestamp(&self) -> usize {
        self.schema_errors.len()
    }

    /// Newest timestamp among the returned rows
    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.iter().filter_map(|r| r.timestamp).max()
    }
}

/// Fetch all rows of `request.table` newer than its watermark
///
/// Transport errors abort the fetch with [`SourceError::Unavailable`]; they
/// are not retried here.
#[instrument(skip(source, request), fields(table = %request.table))]
pub async fn fetch_records(
    source: &dyn RecordSource,
    request: &FetchRequest,
) -> Result<FetchOutcome, SourceError> {
    let mut outcome = FetchOutcome::default();
    let mut by_key: HashMap<String, SourceRecord> = HashMap::new();
    let mut cursor = None;
    let hint = request.hint();

    loop {
        let page = source.query_page(&request.table, hint, cursor).await?;
        outcome.pages += 1;
        outcome.scanned += page.records.len();

        for record in page.records {
            if !request.full_scan {
                let Some(ts) = record.timestamp else {
                    debug!(id = %record.id, "Record has no usable timestamp");
                    outcome.schema_errors.push(SourceError::Schema {
                        table: request.table.clone(),
                        id: record.id,
                    });
                    continue;
                };
                if !request.accepts(ts) {
                    outcome.filtered_out += 1;
                    continue;
                }
            }

            let key = record.dedup_key();
            match by_key.get(&key) {
                Some(existing) if existing.timestamp >= record.timestamp => {
                    outcome.duplicates += 1;
                },
                Some(_) => {
                    outcome.duplicates += 1;
                    by_key.insert(key, record);
                },
                None => {
                    by_key.insert(key, record);
                },
            }
        }

        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let mut records: Vec<SourceRecord> = by_key.into_values().collect();
    records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    outcome.records = records;

    if !outcome.schema_errors.is_empty() {
        warn!(
            table = %request.table,
            skipped = outcome.missing_timestamp(),
            "Records without a usable timestamp were skipped"
        );
    }

    info!(
        table = %request.table,
        pages = outcome.pages,
        scanned = outcome.scanned,
        kept = outcome.records.len(),
        duplicates = outcome.duplicates,
        filtered = outcome.filtered_out,
        "Fetched records"
    );

    Ok(outcome)
}
