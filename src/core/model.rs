// LogSift - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies. These types are the shared vocabulary across
// all layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Log Entry (normalised output of parsing)
// =============================================================================

/// A single parsed log line.
///
/// Immutable once parsed. Every entry keeps the byte offset of its first
/// byte in the source file, which is both the traceability handle and the
/// tie-breaker for entries sharing a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Original line text (without the trailing newline / carriage return).
    pub raw_text: String,

    /// Leading timestamp, interpreted as UTC. `None` for malformed lines.
    pub timestamp: Option<DateTime<Utc>>,

    /// Level token following the timestamp, if any.
    pub level: Option<Level>,

    /// Free text after the timestamp and level. For malformed lines this is
    /// the full line.
    pub message: String,

    /// Byte offset of the line within the source file.
    pub source_offset: u64,

    /// Whether the line starts with a recognised timestamp.
    pub well_formed: bool,
}

impl LogEntry {
    /// Build a malformed entry that preserves the whole line as its message.
    pub fn malformed(raw_text: &str, source_offset: u64) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            timestamp: None,
            level: None,
            message: raw_text.to_string(),
            source_offset,
            well_formed: false,
        }
    }
}

// =============================================================================
// Level
// =============================================================================

/// Recognised level tokens, ordered from most to least severe.
///
/// `WARNING` in a log line is normalised to `Warn`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    /// Canonical upper-case token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    /// Case-insensitive; accepts `WARNING` as an alias of `WARN`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            other => Err(format!(
                "unknown level '{other}' (expected ERROR, WARN, WARNING, INFO, DEBUG or TRACE)"
            )),
        }
    }
}

// =============================================================================
// Chunk ranges
// =============================================================================

/// A contiguous, line-aligned byte range of the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkRange {
    pub id: usize,
    /// Inclusive start offset.
    pub start: u64,
    /// Exclusive end offset.
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Sort policies
// =============================================================================

/// Where malformed (timestamp-less) lines go in a sorted result.
///
/// Malformed lines never take part in timestamp comparisons. In every mode
/// they are counted exactly and none are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPlacement {
    /// Kept out of the ordered stream and returned separately, in file order.
    #[default]
    Separate,

    /// Emitted after every well-formed entry, in file order.
    Trailing,

    /// Emitted directly after the nearest preceding well-formed line in the
    /// file (continuation lines such as stack traces stay with their header).
    Attached,
}

impl FromStr for MalformedPlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "separate" => Ok(Self::Separate),
            "trailing" => Ok(Self::Trailing),
            "attached" => Ok(Self::Attached),
            other => Err(format!(
                "unknown malformed placement '{other}' (expected separate, trailing or attached)"
            )),
        }
    }
}

/// What the orchestrator does when a chunk worker fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any chunk failure fails the whole sort.
    #[default]
    Abort,

    /// Continue with the remaining chunks and report the failed ranges.
    BestEffort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "abort" => Ok(Self::Abort),
            "best_effort" => Ok(Self::BestEffort),
            other => Err(format!(
                "unknown failure policy '{other}' (expected abort or best_effort)"
            )),
        }
    }
}
