// LogSift - platform/config.rs
//
// Configuration directory resolution and config.toml loading with startup
// validation. Every value is checked against the named constants; bad values
// are reported as warnings and replaced by defaults so a typo in the config
// never prevents a sort from running.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::model::{FailurePolicy, MalformedPlacement};
use crate::core::patterns::DetectionConfig;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for LogSift configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logsift/ or %APPDATA%\LogSift\config\)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Full path of the default config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[sort]` section.
    pub sort: SortSection,
    /// `[analysis]` section.
    pub analysis: AnalysisSection,
    /// `[patterns]` section.
    pub patterns: PatternsSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[sort]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SortSection {
    /// Target chunk size in bytes.
    pub chunk_size_bytes: Option<u64>,
    /// Worker ceiling (0 = auto).
    pub max_workers: Option<usize>,
    /// "abort" or "best_effort".
    pub failure_policy: Option<String>,
    /// Wall-time ceiling in seconds (0 = none).
    pub timeout_secs: Option<u64>,
    /// "separate", "trailing" or "attached".
    pub malformed_placement: Option<String>,
    /// Directory under which sorted runs are spilled.
    pub scratch_dir: Option<PathBuf>,
}

/// `[analysis]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    /// Histogram bucket count.
    pub histogram_buckets: Option<usize>,
}

/// `[patterns]` config section. Field meanings match [`DetectionConfig`].
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PatternsSection {
    pub cluster_window_secs: Option<i64>,
    pub min_cluster_size: Option<usize>,
    pub similarity_threshold: Option<f64>,
    pub min_repeat_count: Option<usize>,
    pub max_examples: Option<usize>,
    pub trend_bucket_secs: Option<i64>,
    pub min_trend_buckets: Option<usize>,
    pub spike_z_threshold: Option<f64>,
    pub gap_min_buckets: Option<usize>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    // -- Sort --
    pub chunk_size_bytes: u64,
    /// 0 = host parallelism.
    pub max_workers: usize,
    pub failure_policy: FailurePolicy,
    /// `None` = no wall-time ceiling.
    pub timeout_secs: Option<u64>,
    pub malformed_placement: MalformedPlacement,
    /// `None` = system temp dir.
    pub scratch_dir: Option<PathBuf>,

    // -- Analysis --
    pub histogram_buckets: usize,

    // -- Patterns --
    pub detection: DetectionConfig,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: constants::DEFAULT_CHUNK_SIZE_BYTES,
            max_workers: constants::DEFAULT_MAX_WORKERS,
            failure_policy: FailurePolicy::default(),
            timeout_secs: None,
            malformed_placement: MalformedPlacement::default(),
            scratch_dir: None,
            histogram_buckets: constants::DEFAULT_HISTOGRAM_BUCKETS,
            detection: DetectionConfig::default(),
            log_level: None,
        }
    }
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// A missing file yields defaults with no warnings (first run).
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), Vec::new());
    }
    load_config_file(&config_path)
}

/// Load and validate a specific config file (e.g. from `--config`).
///
/// Unlike [`load_config`], a missing file is reported as a warning since the
/// caller asked for it explicitly.
pub fn load_config_file(config_path: &Path) -> (AppConfig, Vec<String>) {
    match read_raw_config(config_path) {
        Ok(raw) => {
            tracing::info!(path = %config_path.display(), "Loaded config.toml");
            validate_raw(raw)
        }
        Err(e) => {
            let msg = format!("{e}. Using defaults.");
            tracing::warn!("{}", msg);
            (AppConfig::default(), vec![msg])
        }
    }
}

/// Read and parse a config file without validating its values.
///
/// For callers that want an unreadable or malformed file to be an error
/// rather than a warning.
pub fn read_raw_config(config_path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
        path: config_path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: config_path.to_path_buf(),
        source,
    })
}

/// Validate each field against named constants, accumulating all warnings.
pub fn validate_raw(raw: RawConfig) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();
    let mut config = AppConfig::default();

    // -- Sort: chunk_size_bytes --
    if let Some(size) = raw.sort.chunk_size_bytes {
        if (constants::MIN_CHUNK_SIZE_BYTES..=constants::MAX_CHUNK_SIZE_BYTES).contains(&size) {
            config.chunk_size_bytes = size;
        } else {
            warnings.push(format!(
                "[sort] chunk_size_bytes = {size} is out of range ({}-{}). Using default ({}).",
                constants::MIN_CHUNK_SIZE_BYTES,
                constants::MAX_CHUNK_SIZE_BYTES,
                constants::DEFAULT_CHUNK_SIZE_BYTES,
            ));
        }
    }

    // -- Sort: max_workers --
    if let Some(workers) = raw.sort.max_workers {
        if workers <= constants::ABSOLUTE_MAX_WORKERS {
            config.max_workers = workers;
        } else {
            warnings.push(format!(
                "[sort] max_workers = {workers} is out of range (0-{}). Using default (auto).",
                constants::ABSOLUTE_MAX_WORKERS,
            ));
        }
    }

    // -- Sort: failure_policy --
    if let Some(ref policy) = raw.sort.failure_policy {
        match policy.parse::<FailurePolicy>() {
            Ok(p) => config.failure_policy = p,
            Err(e) => warnings.push(format!("[sort] failure_policy: {e}. Using default (abort).")),
        }
    }

    // -- Sort: timeout_secs --
    if let Some(secs) = raw.sort.timeout_secs {
        if secs == 0 {
            config.timeout_secs = None;
        } else if secs <= constants::MAX_SORT_TIMEOUT_SECS {
            config.timeout_secs = Some(secs);
        } else {
            warnings.push(format!(
                "[sort] timeout_secs = {secs} is out of range (0-{}). Using default (none).",
                constants::MAX_SORT_TIMEOUT_SECS,
            ));
        }
    }

    // -- Sort: scratch_dir --
    if let Some(dir) = raw.sort.scratch_dir {
        if dir.is_dir() {
            config.scratch_dir = Some(dir);
        } else {
            warnings.push(format!(
                "[sort] scratch_dir = '{}' is not a directory. Using the system temp dir.",
                dir.display()
            ));
        }
    }

    // -- Sort: malformed_placement --
    if let Some(ref placement) = raw.sort.malformed_placement {
        match placement.parse::<MalformedPlacement>() {
            Ok(p) => config.malformed_placement = p,
            Err(e) => warnings.push(format!(
                "[sort] malformed_placement: {e}. Using default (separate)."
            )),
        }
    }

    // -- Analysis: histogram_buckets --
    if let Some(buckets) = raw.analysis.histogram_buckets {
        if (1..=constants::MAX_HISTOGRAM_BUCKETS).contains(&buckets) {
            config.histogram_buckets = buckets;
        } else {
            warnings.push(format!(
                "[analysis] histogram_buckets = {buckets} is out of range (1-{}). Using default ({}).",
                constants::MAX_HISTOGRAM_BUCKETS,
                constants::DEFAULT_HISTOGRAM_BUCKETS,
            ));
        }
    }

    // -- Patterns: each field is tried on its own against DetectionConfig's
    //    validation, so one bad value does not discard the others.
    let p = &raw.patterns;
    let d = &mut config.detection;
    let w = &mut warnings;
    apply_pattern(d, w, p.cluster_window_secs, |c, v| c.cluster_window_secs = v);
    apply_pattern(d, w, p.min_cluster_size, |c, v| c.min_cluster_size = v);
    apply_pattern(d, w, p.similarity_threshold, |c, v| c.similarity_threshold = v);
    apply_pattern(d, w, p.min_repeat_count, |c, v| c.min_repeat_count = v);
    apply_pattern(d, w, p.max_examples, |c, v| c.max_examples = v);
    apply_pattern(d, w, p.trend_bucket_secs, |c, v| c.trend_bucket_secs = v);
    apply_pattern(d, w, p.min_trend_buckets, |c, v| c.min_trend_buckets = v);
    apply_pattern(d, w, p.spike_z_threshold, |c, v| c.spike_z_threshold = v);
    apply_pattern(d, w, p.gap_min_buckets, |c, v| c.gap_min_buckets = v);

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }

    (config, warnings)
}

fn apply_pattern<T>(
    detection: &mut DetectionConfig,
    warnings: &mut Vec<String>,
    value: Option<T>,
    set: impl FnOnce(&mut DetectionConfig, T),
) {
    let Some(value) = value else {
        return;
    };
    let mut trial = detection.clone();
    set(&mut trial, value);
    match trial.validate() {
        Ok(()) => *detection = trial,
        Err(e) => warnings.push(format!("[patterns] {e}. Using default.")),
    }
}
