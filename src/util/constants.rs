// LogSift - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Config validation and the programmatic configs both read from here.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogSift";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "LogSift";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Sorting limits
// =============================================================================

/// Default target size of a single chunk handed to a sort worker.
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 32 * 1024 * 1024; // 32 MiB

/// Smallest chunk size accepted from configuration. Tiny chunks are legal
/// (tests use them to force many chunks) but zero is not.
pub const MIN_CHUNK_SIZE_BYTES: u64 = 1;

/// Largest chunk size accepted from configuration.
pub const MAX_CHUNK_SIZE_BYTES: u64 = 4 * 1024 * 1024 * 1024; // 4 GiB

/// Default worker ceiling. 0 means auto-detect (host parallelism).
pub const DEFAULT_MAX_WORKERS: usize = 0;

/// Hard upper bound on the worker ceiling (prevents configuration mistakes
/// from spawning thousands of threads).
pub const ABSOLUTE_MAX_WORKERS: usize = 256;

/// Hard upper bound on the sort wall-time ceiling.
pub const MAX_SORT_TIMEOUT_SECS: u64 = 24 * 60 * 60;

// =============================================================================
// Statistics
// =============================================================================

/// Default number of histogram buckets across the observed time span.
pub const DEFAULT_HISTOGRAM_BUCKETS: usize = 50;

/// Upper bound on histogram buckets.
pub const MAX_HISTOGRAM_BUCKETS: usize = 10_000;

// =============================================================================
// Pattern detection defaults
// =============================================================================

/// Sliding window used for error clustering (seconds).
pub const DEFAULT_CLUSTER_WINDOW_SECS: i64 = 60;

/// Minimum number of ERROR entries inside a window to report a cluster.
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 5;

/// Token similarity at or above which two message templates are merged.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Minimum occurrences for a template to count as a repeated pattern.
pub const DEFAULT_MIN_REPEAT_COUNT: usize = 3;

/// Raw example lines kept per repeated pattern.
pub const DEFAULT_MAX_EXAMPLES: usize = 3;

/// Bucket width for trend and anomaly detection (seconds).
pub const DEFAULT_TREND_BUCKET_SECS: i64 = 60;

/// Minimum consecutive buckets of strictly increasing rate to flag a trend.
pub const DEFAULT_MIN_TREND_BUCKETS: usize = 3;

/// Z-score at or above which a bucket is reported as a rate spike.
pub const DEFAULT_SPIKE_Z_THRESHOLD: f64 = 3.0;

/// Consecutive empty buckets between activity reported as a silence.
pub const DEFAULT_GAP_MIN_BUCKETS: usize = 5;

/// Upper bound on window/bucket widths accepted from configuration (1 day).
pub const MAX_WINDOW_SECS: i64 = 86_400;

/// Upper bound on distinct message templates tracked in one detection run.
/// Messages that would create a template beyond this are counted but not
/// tracked individually.
pub const MAX_PATTERN_TEMPLATES: usize = 10_000;

/// Upper bound on distinct normalised messages remembered for the exact-match
/// shortcut to their template. Past it, new texts go through the similarity
/// search instead, which finds the same template.
pub const MAX_TEMPLATE_CACHE_ENTRIES: usize = 4 * MAX_PATTERN_TEMPLATES;

/// Upper bound on example lines kept per pattern.
pub const MAX_EXAMPLES_LIMIT: usize = 100;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
