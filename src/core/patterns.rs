// LogSift - core/patterns.rs
//
// Pattern detection over an entry stream: error clusters, repeated message
// templates, rising per-level rates, rate spikes and silences.
// Core layer: no I/O. Deterministic for identical input and config.
//
// Clustering and trend detection expect timestamp-sorted input (the output
// of a sort). Unsorted input is accepted but degrades their quality.

use crate::core::model::{Level, LogEntry};
use crate::core::normalize::{normalize_message, token_similarity, WILDCARD};
use crate::util::constants::{
    DEFAULT_CLUSTER_WINDOW_SECS, DEFAULT_GAP_MIN_BUCKETS, DEFAULT_MAX_EXAMPLES,
    DEFAULT_MIN_CLUSTER_SIZE, DEFAULT_MIN_REPEAT_COUNT, DEFAULT_MIN_TREND_BUCKETS,
    DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_SPIKE_Z_THRESHOLD, DEFAULT_TREND_BUCKET_SECS,
    MAX_EXAMPLES_LIMIT, MAX_PATTERN_TEMPLATES, MAX_TEMPLATE_CACHE_ENTRIES, MAX_WINDOW_SECS,
};
use crate::util::error::ConfigError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};

// =============================================================================
// Configuration
// =============================================================================

/// Tuning knobs for [`PatternDetector`]. Missing fields take their defaults
/// when deserialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Error clustering window (seconds).
    pub cluster_window_secs: i64,
    /// ERROR entries a window must contain to form a cluster.
    pub min_cluster_size: usize,
    /// Token similarity at or above which two templates merge.
    pub similarity_threshold: f64,
    /// Occurrences needed before a template is reported.
    pub min_repeat_count: usize,
    /// Raw example lines kept per reported template.
    pub max_examples: usize,
    /// Bucket width for trends, spikes and silences (seconds).
    pub trend_bucket_secs: i64,
    /// Strictly increasing buckets needed to flag a trend.
    pub min_trend_buckets: usize,
    /// Z-score at or above which a bucket is a spike.
    pub spike_z_threshold: f64,
    /// Consecutive empty buckets between activity that count as a silence.
    pub gap_min_buckets: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cluster_window_secs: DEFAULT_CLUSTER_WINDOW_SECS,
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            min_repeat_count: DEFAULT_MIN_REPEAT_COUNT,
            max_examples: DEFAULT_MAX_EXAMPLES,
            trend_bucket_secs: DEFAULT_TREND_BUCKET_SECS,
            min_trend_buckets: DEFAULT_MIN_TREND_BUCKETS,
            spike_z_threshold: DEFAULT_SPIKE_Z_THRESHOLD,
            gap_min_buckets: DEFAULT_GAP_MIN_BUCKETS,
        }
    }
}

impl DetectionConfig {
    /// Reject out-of-range values before any entry is examined.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_WINDOW_SECS).contains(&self.cluster_window_secs) {
            return Err(ConfigError::out_of_range(
                "patterns.cluster_window_secs",
                self.cluster_window_secs,
                format!("1..={MAX_WINDOW_SECS}"),
            ));
        }
        if self.min_cluster_size == 0 {
            return Err(ConfigError::out_of_range(
                "patterns.min_cluster_size",
                self.min_cluster_size,
                ">= 1",
            ));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::out_of_range(
                "patterns.similarity_threshold",
                self.similarity_threshold,
                "greater than 0.0 and at most 1.0",
            ));
        }
        if self.min_repeat_count == 0 {
            return Err(ConfigError::out_of_range(
                "patterns.min_repeat_count",
                self.min_repeat_count,
                ">= 1",
            ));
        }
        if self.max_examples > MAX_EXAMPLES_LIMIT {
            return Err(ConfigError::out_of_range(
                "patterns.max_examples",
                self.max_examples,
                format!("0..={MAX_EXAMPLES_LIMIT}"),
            ));
        }
        if !(1..=MAX_WINDOW_SECS).contains(&self.trend_bucket_secs) {
            return Err(ConfigError::out_of_range(
                "patterns.trend_bucket_secs",
                self.trend_bucket_secs,
                format!("1..={MAX_WINDOW_SECS}"),
            ));
        }
        if self.min_trend_buckets < 2 {
            return Err(ConfigError::out_of_range(
                "patterns.min_trend_buckets",
                self.min_trend_buckets,
                ">= 2",
            ));
        }
        if !(self.spike_z_threshold.is_finite() && self.spike_z_threshold > 0.0) {
            return Err(ConfigError::out_of_range(
                "patterns.spike_z_threshold",
                self.spike_z_threshold,
                "a finite value greater than 0.0",
            ));
        }
        if self.gap_min_buckets == 0 {
            return Err(ConfigError::out_of_range(
                "patterns.gap_min_buckets",
                self.gap_min_buckets,
                ">= 1",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Report types
// =============================================================================

/// A run of ERROR entries dense enough to fill at least one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCluster {
    /// Timestamp of the first error in the cluster.
    pub start: DateTime<Utc>,
    /// Timestamp of the last error in the cluster.
    pub end: DateTime<Utc>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepeatedPattern {
    pub template: String,
    pub count: usize,
    pub examples: Vec<String>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A per-level rate that rose in every bucket of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub level: Level,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub buckets: usize,
    /// Entries per second in the first bucket of the run.
    pub start_rate: f64,
    /// Entries per second in the last bucket of the run.
    pub end_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// A bucket whose entry count stands out from the rest.
    RateSpike {
        bucket_start: DateTime<Utc>,
        count: usize,
        zscore: f64,
    },
    /// Empty buckets between two active ones.
    Silence {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        empty_buckets: usize,
    },
}

/// Everything one detection pass found. Recomputed per call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternReport {
    pub anomalies: Vec<Anomaly>,
    pub error_clusters: Vec<ErrorCluster>,
    pub repeated_patterns: Vec<RepeatedPattern>,
    pub trending: Vec<Trend>,
    pub entries_examined: usize,
    /// Messages not tracked because the template table was full.
    pub untracked_messages: usize,
}

// =============================================================================
// Detector
// =============================================================================

#[derive(Debug)]
struct TemplateStat {
    tokens: Vec<String>,
    count: usize,
    examples: Vec<String>,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

/// Streaming detector. Feed entries with [`push`](Self::push), then call
/// [`finish`](Self::finish).
#[derive(Debug)]
pub struct PatternDetector {
    config: DetectionConfig,
    examined: usize,
    untracked: usize,
    error_times: Vec<DateTime<Utc>>,
    templates: Vec<TemplateStat>,
    /// Exact normalised text -> template index, at most `cache_limit` entries.
    exact: HashMap<String, usize>,
    cache_limit: usize,
    /// Token count -> template indices, in creation order.
    by_len: HashMap<usize, Vec<usize>>,
    /// Bucket index -> entries, all levels.
    all_buckets: BTreeMap<i64, usize>,
    /// Level -> bucket index -> entries.
    level_buckets: BTreeMap<Level, BTreeMap<i64, usize>>,
}

impl PatternDetector {
    pub fn new(config: DetectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            examined: 0,
            untracked: 0,
            error_times: Vec::new(),
            templates: Vec::new(),
            exact: HashMap::new(),
            cache_limit: MAX_TEMPLATE_CACHE_ENTRIES,
            by_len: HashMap::new(),
            all_buckets: BTreeMap::new(),
            level_buckets: BTreeMap::new(),
        })
    }

    pub fn push(&mut self, entry: &LogEntry) {
        self.examined += 1;

        if let Some(ts) = entry.timestamp {
            if entry.level == Some(Level::Error) {
                self.error_times.push(ts);
            }
            let bucket = ts.timestamp().div_euclid(self.config.trend_bucket_secs);
            *self.all_buckets.entry(bucket).or_insert(0) += 1;
            if let Some(level) = entry.level {
                *self
                    .level_buckets
                    .entry(level)
                    .or_default()
                    .entry(bucket)
                    .or_insert(0) += 1;
            }
        }

        self.record_template(entry);
    }

    fn record_template(&mut self, entry: &LogEntry) {
        let normalized = normalize_message(&entry.message);

        let index = match self.exact.get(&normalized) {
            Some(&i) => i,
            None => {
                let tokens: Vec<String> =
                    normalized.split(' ').filter(|t| !t.is_empty()).map(String::from).collect();
                match self.find_similar(&tokens) {
                    Some(i) => {
                        merge_tokens(&mut self.templates[i].tokens, &tokens);
                        self.remember(normalized, i);
                        i
                    }
                    None if self.templates.len() >= MAX_PATTERN_TEMPLATES => {
                        self.untracked += 1;
                        return;
                    }
                    None => {
                        let i = self.templates.len();
                        self.by_len.entry(tokens.len()).or_default().push(i);
                        self.templates.push(TemplateStat {
                            tokens,
                            count: 0,
                            examples: Vec::new(),
                            first_seen: None,
                            last_seen: None,
                        });
                        self.remember(normalized, i);
                        i
                    }
                }
            }
        };

        let stat = &mut self.templates[index];
        stat.count += 1;
        if stat.examples.len() < self.config.max_examples {
            stat.examples.push(entry.raw_text.clone());
        }
        if let Some(ts) = entry.timestamp {
            stat.first_seen = Some(stat.first_seen.map_or(ts, |f| f.min(ts)));
            stat.last_seen = Some(stat.last_seen.map_or(ts, |l| l.max(ts)));
        }
    }

    fn remember(&mut self, normalized: String, index: usize) {
        if self.exact.len() < self.cache_limit {
            self.exact.insert(normalized, index);
        }
    }

    /// Most similar existing template of the same length, if it clears the
    /// threshold. The earliest template wins ties.
    fn find_similar(&self, tokens: &[String]) -> Option<usize> {
        let candidates = self.by_len.get(&tokens.len())?;
        let mut best: Option<(usize, f64)> = None;
        for &i in candidates {
            let sim = token_similarity(&self.templates[i].tokens, tokens);
            if sim >= self.config.similarity_threshold
                && best.map_or(true, |(_, b)| sim > b)
            {
                best = Some((i, sim));
                if sim >= 1.0 {
                    break;
                }
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn finish(self) -> PatternReport {
        let error_clusters = cluster_errors(
            &self.error_times,
            Duration::seconds(self.config.cluster_window_secs),
            self.config.min_cluster_size,
        );

        let mut repeated_patterns: Vec<RepeatedPattern> = self
            .templates
            .into_iter()
            .filter(|t| t.count >= self.config.min_repeat_count)
            .map(|t| RepeatedPattern {
                template: t.tokens.join(" "),
                count: t.count,
                examples: t.examples,
                first_seen: t.first_seen,
                last_seen: t.last_seen,
            })
            .collect();
        repeated_patterns
            .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.template.cmp(&b.template)));

        let width = self.config.trend_bucket_secs;
        let trending: Vec<Trend> = self
            .level_buckets
            .iter()
            .flat_map(|(&level, buckets)| {
                rising_runs(buckets, self.config.min_trend_buckets)
                    .into_iter()
                    .map(move |(first, last, start_count, end_count)| Trend {
                        level,
                        start: bucket_time(first, width),
                        end: bucket_time(last + 1, width),
                        buckets: (last - first + 1) as usize,
                        start_rate: start_count as f64 / width as f64,
                        end_rate: end_count as f64 / width as f64,
                    })
            })
            .collect();

        let mut anomalies = rate_spikes(&self.all_buckets, width, self.config.spike_z_threshold);
        anomalies.extend(silences(&self.all_buckets, width, self.config.gap_min_buckets));

        tracing::debug!(
            entries = self.examined,
            clusters = error_clusters.len(),
            patterns = repeated_patterns.len(),
            trends = trending.len(),
            anomalies = anomalies.len(),
            untracked = self.untracked,
            "Pattern detection complete"
        );

        PatternReport {
            anomalies,
            error_clusters,
            repeated_patterns,
            trending,
            entries_examined: self.examined,
            untracked_messages: self.untracked,
        }
    }
}

/// Run detection over `entries`. The config is validated first.
pub fn detect<I>(entries: I, config: &DetectionConfig) -> Result<PatternReport, ConfigError>
where
    I: IntoIterator,
    I::Item: Borrow<LogEntry>,
{
    let mut detector = PatternDetector::new(config.clone())?;
    for entry in entries {
        detector.push(entry.borrow());
    }
    Ok(detector.finish())
}

// =============================================================================
// Algorithms
// =============================================================================

fn merge_tokens(template: &mut [String], other: &[String]) {
    for (t, o) in template.iter_mut().zip(other) {
        if t != o && t != WILDCARD {
            *t = WILDCARD.to_string();
        }
    }
}

/// Union of every window `[t_i, t_i + window)` holding at least `min_size`
/// errors. Overlapping qualifying windows form one cluster.
fn cluster_errors(
    times: &[DateTime<Utc>],
    window: Duration,
    min_size: usize,
) -> Vec<ErrorCluster> {
    let n = times.len();
    let mut clusters = Vec::new();
    // (first index, last index, end of the latest qualifying window)
    let mut current: Option<(usize, usize, DateTime<Utc>)> = None;
    let mut hi = 0;

    for i in 0..n {
        let window_end = times[i] + window;
        hi = hi.max(i);
        while hi < n && times[hi] < window_end {
            hi += 1;
        }
        if hi - i < min_size {
            continue;
        }
        current = match current {
            Some((first, _, end)) if times[i] < end => Some((first, hi - 1, window_end)),
            Some((first, last, _)) => {
                clusters.push(make_cluster(times, first, last));
                Some((i, hi - 1, window_end))
            }
            None => Some((i, hi - 1, window_end)),
        };
    }
    if let Some((first, last, _)) = current {
        clusters.push(make_cluster(times, first, last));
    }
    clusters
}

fn make_cluster(times: &[DateTime<Utc>], first: usize, last: usize) -> ErrorCluster {
    ErrorCluster {
        start: times[first],
        end: times[last],
        count: last - first + 1,
    }
}

/// Strictly increasing runs over the zero-filled bucket series, as
/// `(first bucket, last bucket, first count, last count)`.
///
/// Only the empty bucket directly before an active one can take part in a
/// run (two consecutive zeros never increase), so longer gaps are skipped
/// without materialising them.
fn rising_runs(buckets: &BTreeMap<i64, usize>, min_len: usize) -> Vec<(i64, i64, usize, usize)> {
    let mut series: Vec<(i64, usize)> = Vec::with_capacity(buckets.len() * 2);
    let mut prev: Option<i64> = None;
    for (&k, &c) in buckets {
        if let Some(p) = prev {
            if k > p + 1 {
                series.push((k - 1, 0));
            }
        }
        series.push((k, c));
        prev = Some(k);
    }

    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=series.len() {
        let continues = i < series.len()
            && series[i].0 == series[i - 1].0 + 1
            && series[i].1 > series[i - 1].1;
        if !continues {
            if i - start >= min_len {
                let (first, c0) = series[start];
                let (last, c1) = series[i - 1];
                runs.push((first, last, c0, c1));
            }
            start = i;
        }
    }
    runs
}

/// Buckets whose count has a z-score of at least `threshold` against the
/// zero-filled series between the first and last active bucket.
fn rate_spikes(buckets: &BTreeMap<i64, usize>, width: i64, threshold: f64) -> Vec<Anomaly> {
    let (Some((&lo, _)), Some((&hi, _))) = (buckets.first_key_value(), buckets.last_key_value())
    else {
        return Vec::new();
    };
    let n = (hi - lo + 1) as f64;
    let sum: f64 = buckets.values().map(|&c| c as f64).sum();
    let sum_sq: f64 = buckets.values().map(|&c| (c as f64) * (c as f64)).sum();
    let mean = sum / n;
    let std = (sum_sq / n - mean * mean).max(0.0).sqrt();
    if std <= 0.0 {
        return Vec::new();
    }
    buckets
        .iter()
        .filter_map(|(&k, &c)| {
            let z = (c as f64 - mean) / std;
            (z >= threshold).then(|| Anomaly::RateSpike {
                bucket_start: bucket_time(k, width),
                count: c,
                zscore: z,
            })
        })
        .collect()
}

fn silences(buckets: &BTreeMap<i64, usize>, width: i64, min_empty: usize) -> Vec<Anomaly> {
    let keys: Vec<i64> = buckets.keys().copied().collect();
    keys.windows(2)
        .filter_map(|w| {
            let empty = (w[1] - w[0] - 1) as usize;
            (empty >= min_empty).then(|| Anomaly::Silence {
                start: bucket_time(w[0] + 1, width),
                end: bucket_time(w[1], width),
                empty_buckets: empty,
            })
        })
        .collect()
}

fn bucket_time(index: i64, width: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(index.saturating_mul(width), 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_line;

    fn parse_all(lines: &[String]) -> Vec<LogEntry> {
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| parse_line(l, i as u64 * 64))
            .collect()
    }

    fn at(min: u32, sec: u32, level: &str, msg: &str) -> String {
        format!("2024-01-15 10:{min:02}:{sec:02} {level} {msg}")
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(DetectionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = DetectionConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        let err = PatternDetector::new(cfg).unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));

        let cfg = DetectionConfig {
            cluster_window_secs: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_config_deserialises_with_defaults() {
        let cfg: DetectionConfig =
            serde_json::from_str(r#"{"min_cluster_size": 2}"#).unwrap();
        assert_eq!(cfg.min_cluster_size, 2);
        assert_eq!(cfg.cluster_window_secs, DEFAULT_CLUSTER_WINDOW_SECS);
    }

    #[test]
    fn test_single_cluster_over_dense_errors() {
        let lines: Vec<String> = (0..10).map(|s| at(0, s, "ERROR", "boom")).collect();
        let report = detect(parse_all(&lines), &DetectionConfig::default()).unwrap();
        assert_eq!(report.error_clusters.len(), 1);
        let c = &report.error_clusters[0];
        assert_eq!(c.count, 10);
        assert_eq!((c.end - c.start).num_seconds(), 9);
    }

    #[test]
    fn test_sparse_errors_form_no_cluster() {
        let lines: Vec<String> = (0..5).map(|m| at(m * 2, 0, "ERROR", "rare")).collect();
        let report = detect(parse_all(&lines), &DetectionConfig::default()).unwrap();
        assert!(report.error_clusters.is_empty());
    }

    #[test]
    fn test_separate_bursts_form_separate_clusters() {
        let mut lines: Vec<String> = (0..5).map(|s| at(0, s, "ERROR", "first")).collect();
        lines.extend((0..6).map(|s| at(30, s, "ERROR", "second")));
        lines.push(at(31, 0, "INFO", "calm"));
        let report = detect(parse_all(&lines), &DetectionConfig::default()).unwrap();
        assert_eq!(report.error_clusters.len(), 2);
        assert_eq!(report.error_clusters[0].count, 5);
        assert_eq!(report.error_clusters[1].count, 6);
    }

    #[test]
    fn test_non_error_levels_ignored_by_clustering() {
        let lines: Vec<String> = (0..10).map(|s| at(0, s, "WARN", "meh")).collect();
        let report = detect(parse_all(&lines), &DetectionConfig::default()).unwrap();
        assert!(report.error_clusters.is_empty());
    }

    #[test]
    fn test_repeated_patterns_with_examples() {
        let mut lines: Vec<String> = (0..5)
            .map(|i| at(0, i, "INFO", &format!("user {i} logged in")))
            .collect();
        lines.push(at(0, 10, "INFO", "cache flushed"));
        let report = detect(parse_all(&lines), &DetectionConfig::default()).unwrap();

        assert_eq!(report.repeated_patterns.len(), 1);
        let p = &report.repeated_patterns[0];
        assert_eq!(p.template, "user <NUM> logged in");
        assert_eq!(p.count, 5);
        assert_eq!(p.examples.len(), DEFAULT_MAX_EXAMPLES);
        assert_eq!(p.examples[0], lines[0]);
        assert_eq!(p.first_seen, parse_line(&lines[0], 0).timestamp);
        assert_eq!(p.last_seen, parse_line(&lines[4], 0).timestamp);
    }

    #[test]
    fn test_similar_templates_merge_with_wildcard() {
        let lines: Vec<String> = ["alpha", "beta", "gamma", "delta"]
            .iter()
            .enumerate()
            .map(|(i, name)| at(0, i as u32, "WARN", &format!("slow query on table {name} detected")))
            .collect();
        let report = detect(parse_all(&lines), &DetectionConfig::default()).unwrap();
        assert_eq!(report.repeated_patterns.len(), 1);
        assert_eq!(
            report.repeated_patterns[0].template,
            "slow query on table <*> detected"
        );
        assert_eq!(report.repeated_patterns[0].count, 4);
    }

    #[test]
    fn test_exact_match_cache_is_bounded() {
        let name = |mut n: usize| {
            let mut word = String::new();
            loop {
                word.push(char::from(b'a' + (n % 26) as u8));
                n /= 26;
                if n == 0 {
                    return word;
                }
            }
        };
        let mut detector = PatternDetector::new(DetectionConfig::default()).unwrap();
        detector.cache_limit = 8;
        for i in 0..200 {
            let message = format!("slow query on table {} detected", name(i));
            let line = at(0, (i % 60) as u32, "WARN", &message);
            detector.push(&parse_line(&line, i as u64 * 64));
            assert!(detector.exact.len() <= 8);
        }
        // Texts past the cache still reach their template.
        let repeat = at(1, 0, "WARN", "slow query on table a detected");
        detector.push(&parse_line(&repeat, 200 * 64));

        let report = detector.finish();
        assert_eq!(report.repeated_patterns.len(), 1);
        assert_eq!(report.repeated_patterns[0].count, 201);
        assert_eq!(report.untracked_messages, 0);
    }

    #[test]
    fn test_dissimilar_templates_stay_apart() {
        let cfg = DetectionConfig {
            min_repeat_count: 1,
            ..Default::default()
        };
        let lines = vec![at(0, 0, "INFO", "disk full"), at(0, 1, "INFO", "net down")];
        let report = detect(parse_all(&lines), &cfg).unwrap();
        assert_eq!(report.repeated_patterns.len(), 2);
        // Equal counts sort by template text.
        assert_eq!(report.repeated_patterns[0].template, "disk full");
    }

    #[test]
    fn test_rising_warn_rate_is_trending() {
        let mut lines = Vec::new();
        for (minute, n) in [(0u32, 1u32), (1, 2), (2, 4), (3, 7)] {
            for s in 0..n {
                lines.push(at(minute, s, "WARN", "pressure"));
            }
        }
        let report = detect(parse_all(&lines), &DetectionConfig::default()).unwrap();
        assert_eq!(report.trending.len(), 1);
        let t = &report.trending[0];
        assert_eq!(t.level, Level::Warn);
        assert_eq!(t.buckets, 4);
        assert!(t.end_rate > t.start_rate);
    }

    #[test]
    fn test_flat_rate_is_not_trending() {
        let lines: Vec<String> = (0..5).map(|m| at(m, 0, "INFO", "tick")).collect();
        let report = detect(parse_all(&lines), &DetectionConfig::default()).unwrap();
        assert!(report.trending.is_empty());
    }

    #[test]
    fn test_rising_runs_bridges_single_empty_bucket() {
        let buckets: BTreeMap<i64, usize> = [(10, 1), (11, 3)].into_iter().collect();
        // Zero-filling starts at the first active bucket.
        assert_eq!(rising_runs(&buckets, 2), vec![(10, 11, 1, 3)]);

        let buckets: BTreeMap<i64, usize> = [(5, 4), (8, 1), (9, 2)].into_iter().collect();
        assert_eq!(rising_runs(&buckets, 3), vec![(7, 9, 0, 2)]);
    }

    #[test]
    fn test_spike_and_silence_anomalies() {
        let mut lines = Vec::new();
        for minute in 0..10u32 {
            lines.push(at(minute, 0, "INFO", "steady"));
        }
        for s in 0..40u32 {
            lines.push(format!("2024-01-15 10:10:{s:02} INFO burst"));
        }
        lines.push(at(30, 0, "INFO", "after the quiet"));

        let report = detect(parse_all(&lines), &DetectionConfig::default()).unwrap();
        let spikes: Vec<_> = report
            .anomalies
            .iter()
            .filter(|a| matches!(a, Anomaly::RateSpike { count: 40, .. }))
            .collect();
        assert_eq!(spikes.len(), 1);

        let silences: Vec<_> = report
            .anomalies
            .iter()
            .filter_map(|a| match a {
                Anomaly::Silence { empty_buckets, .. } => Some(*empty_buckets),
                _ => None,
            })
            .collect();
        assert_eq!(silences, vec![19]);
    }

    #[test]
    fn test_deterministic_output() {
        let lines: Vec<String> = (0..50)
            .map(|i| {
                let level = if i % 3 == 0 { "ERROR" } else { "INFO" };
                at(i / 10, i % 10, level, &format!("job {i} state {}", i % 4))
            })
            .collect();
        let entries = parse_all(&lines);
        let a = detect(&entries, &DetectionConfig::default()).unwrap();
        let b = detect(&entries, &DetectionConfig::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.entries_examined, 50);
    }
}
