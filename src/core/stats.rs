// LogSift - core/stats.rs
//
// Single-pass statistics over an entry stream.
// Core layer: no I/O. Works on sorted or unsorted input because bucket
// assignment depends only on each entry's own timestamp.

use crate::core::model::{Level, LogEntry};
use crate::util::constants::{DEFAULT_HISTOGRAM_BUCKETS, MAX_HISTOGRAM_BUCKETS};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::BTreeMap;

/// One histogram bucket: `[start, end)`; the final bucket also holds `end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
}

/// Result of a statistics pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_count: usize,
    pub well_formed_count: usize,
    pub malformed_count: usize,

    /// Entries per level. Levels that never occur are absent.
    pub level_counts: BTreeMap<Level, usize>,

    /// Well-formed entries without a level token.
    pub unleveled_count: usize,

    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,

    /// `last - first` in milliseconds, 0 without timestamps.
    pub time_span_ms: i64,

    /// Width of each histogram bucket in milliseconds, 0 without timestamps.
    pub bucket_width_ms: i64,

    pub histogram: Vec<HistogramBucket>,

    /// `well_formed_count / total_count`; 0.0 for empty input.
    pub data_quality_score: f64,

    /// Well-formed entries per second across the span. `None` when the span
    /// is zero.
    pub average_rate_per_sec: Option<f64>,

    /// Busiest bucket (earliest wins on ties).
    pub peak_bucket: Option<HistogramBucket>,
}

/// Streaming accumulator behind [`analyze`].
///
/// Timestamps are tallied per millisecond so the histogram can be laid out
/// once the full span is known, without a second pass over the entries.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    total: usize,
    well_formed: usize,
    malformed: usize,
    unleveled: usize,
    levels: BTreeMap<Level, usize>,
    per_millis: BTreeMap<i64, usize>,
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: &LogEntry) {
        self.total += 1;

        if let Some(level) = entry.level {
            *self.levels.entry(level).or_insert(0) += 1;
        }

        // Entries without a timestamp count as malformed and stay out of
        // the histogram.
        let Some(ts) = entry.timestamp else {
            self.malformed += 1;
            return;
        };

        self.well_formed += 1;
        if entry.level.is_none() {
            self.unleveled += 1;
        }
        *self.per_millis.entry(ts.timestamp_millis()).or_insert(0) += 1;
        self.first = Some(self.first.map_or(ts, |f| f.min(ts)));
        self.last = Some(self.last.map_or(ts, |l| l.max(ts)));
    }

    /// Lay out the histogram and produce the final figures.
    ///
    /// `bucket_count` is clamped to `1..=MAX_HISTOGRAM_BUCKETS`.
    pub fn finish(self, bucket_count: usize) -> Statistics {
        let buckets = bucket_count.clamp(1, MAX_HISTOGRAM_BUCKETS);

        let data_quality_score = if self.total == 0 {
            0.0
        } else {
            self.well_formed as f64 / self.total as f64
        };

        let (time_span_ms, bucket_width_ms, histogram) = match (self.first, self.last) {
            (Some(first), Some(last)) => {
                let span = (last - first).num_milliseconds().max(0);
                let width = (span / buckets as i64).max(1);
                let histogram = build_histogram(first, span, width, buckets, &self.per_millis);
                (span, width, histogram)
            }
            _ => (0, 0, Vec::new()),
        };

        let average_rate_per_sec = (time_span_ms > 0)
            .then(|| self.well_formed as f64 / (time_span_ms as f64 / 1000.0));

        let peak_bucket = histogram
            .iter()
            .fold(None::<&HistogramBucket>, |best, b| match best {
                Some(p) if p.count >= b.count => Some(p),
                _ => Some(b),
            })
            .filter(|b| b.count > 0)
            .cloned();

        Statistics {
            total_count: self.total,
            well_formed_count: self.well_formed,
            malformed_count: self.malformed,
            level_counts: self.levels,
            unleveled_count: self.unleveled,
            first_timestamp: self.first,
            last_timestamp: self.last,
            time_span_ms,
            bucket_width_ms,
            histogram,
            data_quality_score,
            average_rate_per_sec,
            peak_bucket,
        }
    }
}

fn build_histogram(
    first: DateTime<Utc>,
    span_ms: i64,
    width_ms: i64,
    max_buckets: usize,
    per_millis: &BTreeMap<i64, usize>,
) -> Vec<HistogramBucket> {
    // A short span with a 1ms floor may need fewer buckets than requested.
    let n = ((span_ms / width_ms) as usize + 1).min(max_buckets);
    let base = first.timestamp_millis();

    let mut counts = vec![0usize; n];
    for (&ms, &count) in per_millis {
        let idx = (((ms - base) / width_ms) as usize).min(n - 1);
        counts[idx] += count;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let start = first + Duration::milliseconds(i as i64 * width_ms);
            let end = if i + 1 == n {
                first + Duration::milliseconds(span_ms.max((i as i64 + 1) * width_ms))
            } else {
                start + Duration::milliseconds(width_ms)
            };
            HistogramBucket { start, end, count }
        })
        .collect()
}

/// Analyse `entries` with the default bucket count.
pub fn analyze<I>(entries: I) -> Statistics
where
    I: IntoIterator,
    I::Item: Borrow<LogEntry>,
{
    analyze_with_buckets(entries, DEFAULT_HISTOGRAM_BUCKETS)
}

/// Analyse `entries` laying the histogram out over `bucket_count` buckets.
pub fn analyze_with_buckets<I>(entries: I, bucket_count: usize) -> Statistics
where
    I: IntoIterator,
    I::Item: Borrow<LogEntry>,
{
    let mut acc = StatsAccumulator::new();
    for entry in entries {
        acc.push(entry.borrow());
    }
    acc.finish(bucket_count)
}
