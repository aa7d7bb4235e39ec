// LogSift - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Malformed log lines are NOT errors: they are classified by the parser and
// surface as counts on the sort and statistics results.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all LogSift operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum LogSiftError {
    /// The input file could not be opened, mapped, or scanned.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },

    /// The parallel sort did not complete.
    Sort(SortError),

    /// A filter specification was rejected.
    Filter(FilterError),

    /// Configuration loading or validation failed.
    Config(ConfigError),
}

impl fmt::Display for LogSiftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
            Self::Sort(e) => write!(f, "Sort error: {e}"),
            Self::Filter(e) => write!(f, "Filter error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for LogSiftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Sort(e) => Some(e),
            Self::Filter(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Sort errors
// ---------------------------------------------------------------------------

/// A single worker's failure to read or sort its byte range.
#[derive(Debug)]
pub struct ChunkFailure {
    pub chunk_id: usize,
    pub start: u64,
    pub end: u64,
    pub source: io::Error,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} (bytes {}..{}): {}",
            self.chunk_id, self.start, self.end, self.source
        )
    }
}

impl std::error::Error for ChunkFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Errors that end a sort before the merged stream is produced.
#[derive(Debug)]
pub enum SortError {
    /// One or more chunks failed under the abort-on-failure policy.
    ChunksFailed { failures: Vec<ChunkFailure> },

    /// The sort was cancelled between chunks.
    Cancelled { completed: usize, total: usize },

    /// The wall-time ceiling elapsed before every chunk was scheduled.
    TimedOut {
        completed: usize,
        total: usize,
        limit: Duration,
    },

    /// The worker pool could not be created.
    WorkerPool { reason: String },
}

impl fmt::Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChunksFailed { failures } => {
                write!(f, "{} chunk(s) failed:", failures.len())?;
                for failure in failures {
                    write!(f, " [{failure}]")?;
                }
                Ok(())
            }
            Self::Cancelled { completed, total } => {
                write!(f, "cancelled after {completed} of {total} chunks")
            }
            Self::TimedOut {
                completed,
                total,
                limit,
            } => write!(
                f,
                "timed out after {:.1}s with {completed} of {total} chunks sorted",
                limit.as_secs_f64()
            ),
            Self::WorkerPool { reason } => {
                write!(f, "failed to start worker pool: {reason}")
            }
        }
    }
}

impl std::error::Error for SortError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ChunksFailed { failures } => failures
                .first()
                .map(|f| f as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<SortError> for LogSiftError {
    fn from(e: SortError) -> Self {
        Self::Sort(e)
    }
}

// ---------------------------------------------------------------------------
// Filter errors
// ---------------------------------------------------------------------------

/// Errors found while compiling a filter specification. `index` is the
/// position of the offending condition within the filter spec.
#[derive(Debug)]
pub enum FilterError {
    /// A `matches` condition carries an invalid regex.
    InvalidRegex {
        index: usize,
        pattern: String,
        source: regex::Error,
    },

    /// The operator cannot be applied to the field.
    UnsupportedOperator {
        index: usize,
        field: &'static str,
        operator: &'static str,
    },

    /// The value has the wrong shape or cannot be interpreted for the field.
    InvalidValue {
        index: usize,
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegex {
                index,
                pattern,
                source,
            } => write!(f, "condition {index}: invalid regex '{pattern}': {source}"),
            Self::UnsupportedOperator {
                index,
                field,
                operator,
            } => write!(
                f,
                "condition {index}: operator '{operator}' is not supported for field '{field}'"
            ),
            Self::InvalidValue {
                index,
                field,
                value,
                reason,
            } => write!(
                f,
                "condition {index}: invalid value '{value}' for field '{field}': {reason}"
            ),
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<FilterError> for LogSiftError {
    fn from(e: FilterError) -> Self {
        Self::Filter(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading and validation.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl ConfigError {
    /// Shorthand used by the `validate()` methods.
    pub(crate) fn out_of_range(
        field: &str,
        value: impl fmt::Display,
        expected: impl Into<String>,
    ) -> Self {
        Self::ValueOutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LogSiftError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for LogSift results.
pub type Result<T> = std::result::Result<T, LogSiftError>;
