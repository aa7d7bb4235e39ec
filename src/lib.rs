// LogSift - lib.rs
//
// Library entry point. The four engine operations are re-exported at the
// crate root together with the types they take and return; the layer
// modules stay public for callers that need finer control (streaming
// accumulators, cancellation, compiled filters).

pub mod app;
pub mod core;
pub mod platform;
pub mod util;

pub use crate::app::sort::{CancelToken, LogSorter, SortConfig, SortResult};
pub use crate::app::{analyze_log_statistics, detect_patterns, filter_entries, sort_log_file};
pub use crate::core::filter::{
    Field, FilterCondition, FilterSpec, FilterValue, LogicalOp, MatchStats, Operator,
};
pub use crate::core::merge::{MalformedEntries, OrderedEntries, StreamErrorSlot};
pub use crate::core::model::{ChunkRange, FailurePolicy, Level, LogEntry, MalformedPlacement};
pub use crate::core::patterns::{
    Anomaly, DetectionConfig, ErrorCluster, PatternReport, RepeatedPattern, Trend,
};
pub use crate::core::stats::{HistogramBucket, Statistics};
pub use crate::util::error::{ChunkFailure, ConfigError, FilterError, LogSiftError, Result, SortError};
