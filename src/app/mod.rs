// LogSift - app/mod.rs
//
// Application layer: sort orchestration and the public entry points.
// Dependencies: core, platform, util.
//
// The four entry points below are the whole external surface. Callers turn
// their results into JSON, CSV or text themselves.

pub mod sort;
pub mod sorter;

use crate::core::filter::{self, FilterSpec, MatchStats};
use crate::core::model::LogEntry;
use crate::core::patterns::{self, DetectionConfig, PatternReport};
use crate::core::stats::{self, Statistics};
use crate::util::error::Result;
use std::borrow::Borrow;
use std::path::Path;

use sort::{LogSorter, SortConfig, SortResult};

/// Sort `path` by timestamp using the default sort settings, overriding the
/// chunk size and worker ceiling when given.
///
/// Invalid overrides are rejected before the file is opened.
pub fn sort_log_file(
    path: &Path,
    chunk_size_bytes: Option<u64>,
    max_workers: Option<usize>,
) -> Result<SortResult> {
    let mut config = SortConfig::default();
    if let Some(bytes) = chunk_size_bytes {
        config.chunk_size_bytes = bytes;
    }
    if let Some(workers) = max_workers {
        config.max_workers = workers;
    }
    let sorter = LogSorter::new(config)?;
    sorter.sort_file(path)
}

/// Counts, level distribution, time range, histogram and quality score.
pub fn analyze_log_statistics<I>(entries: I) -> Statistics
where
    I: IntoIterator,
    I::Item: Borrow<LogEntry>,
{
    stats::analyze(entries)
}

/// Error clusters, repeated messages, rising levels and rate anomalies.
/// `None` uses the default detection settings.
pub fn detect_patterns<I>(entries: I, config: Option<&DetectionConfig>) -> Result<PatternReport>
where
    I: IntoIterator,
    I::Item: Borrow<LogEntry>,
{
    let report = match config {
        Some(config) => patterns::detect(entries, config)?,
        None => patterns::detect(entries, &DetectionConfig::default())?,
    };
    Ok(report)
}

/// Entries matching `spec`, in input order, with per-condition hit counts.
pub fn filter_entries<I>(entries: I, spec: &FilterSpec) -> Result<(Vec<LogEntry>, MatchStats)>
where
    I: IntoIterator<Item = LogEntry>,
{
    Ok(filter::filter_entries(entries, spec)?)
}
