// LogSift - main.rs
//
// Command-line front end. Handles:
// 1. CLI argument parsing
// 2. Config loading (default location or --config)
// 3. Logging initialisation (debug mode support)
// 4. Dispatch to the engine and output of its results
//
// Sorted and filtered lines go to stdout; statistics and pattern reports are
// printed as JSON. Diagnostics go to stderr through tracing.

use clap::{Args, Parser, Subcommand};
use logsift::app::sort::{LogSorter, SortConfig, SortResult};
use logsift::core::filter::{Field, FilterCondition, FilterSpec, FilterValue, LogicalOp, Operator};
use logsift::core::merge::StreamErrorSlot;
use logsift::core::model::{FailurePolicy, LogEntry, MalformedPlacement};
use logsift::core::{patterns, stats};
use logsift::platform::config::{self, AppConfig, PlatformPaths};
use logsift::util::{self, error::LogSiftError};
use serde::Serialize;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// LogSift - Parallel chunked log sorter and analyser.
///
/// Sorts large timestamped text logs by splitting them into line-aligned
/// chunks, sorting the chunks in parallel and merging the results.
#[derive(Parser, Debug)]
#[command(name = "logsift", version, about)]
struct Cli {
    /// Config file to use instead of the platform default location.
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the lines of FILE in timestamp order.
    Sort {
        #[command(flatten)]
        sort: SortArgs,
    },
    /// Print statistics for FILE as JSON.
    Stats {
        #[command(flatten)]
        sort: SortArgs,

        /// Number of histogram buckets across the time span.
        #[arg(long = "buckets")]
        buckets: Option<usize>,
    },
    /// Print detected patterns and anomalies for FILE as JSON.
    Patterns {
        #[command(flatten)]
        sort: SortArgs,
    },
    /// Print the lines of FILE that match a filter, in timestamp order.
    Filter {
        #[command(flatten)]
        sort: SortArgs,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args, Debug)]
struct SortArgs {
    /// Log file to process.
    file: PathBuf,

    /// Target chunk size in bytes.
    #[arg(long = "chunk-size")]
    chunk_size: Option<u64>,

    /// Maximum number of sort workers (0 = one per CPU).
    #[arg(short = 'w', long = "workers")]
    workers: Option<usize>,

    /// Skip chunks that fail to read instead of aborting.
    #[arg(long = "best-effort")]
    best_effort: bool,

    /// Give up if chunks are still unscheduled after this many seconds
    /// (0 = no limit).
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Directory under which sorted runs are spilled (default: system temp dir).
    #[arg(long = "scratch-dir")]
    scratch_dir: Option<PathBuf>,

    /// Where lines without a timestamp go: separate, trailing or attached.
    #[arg(long = "malformed")]
    malformed: Option<MalformedPlacement>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Built-in filter: errors_only, warnings_and_errors or exclude_debug.
    #[arg(short = 'p', long = "preset", conflicts_with = "spec_json")]
    preset: Option<String>,

    /// JSON file holding a full filter specification.
    #[arg(long = "spec-json")]
    spec_json: Option<PathBuf>,

    /// Keep entries at or after this time (e.g. "2024-01-15 10:00:00").
    #[arg(long = "from", conflicts_with = "spec_json")]
    from: Option<String>,

    /// Keep entries strictly before this time.
    #[arg(long = "to", conflicts_with = "spec_json")]
    to: Option<String>,

    /// Keep entries whose message contains this text (case-insensitive).
    #[arg(short = 'k', long = "keyword", conflicts_with = "spec_json")]
    keyword: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Config is read before logging starts so its level can take effect;
    // its warnings are replayed once the subscriber is up.
    let (app_config, config_warnings) = match cli.config.as_deref() {
        Some(path) => config::load_config_file(path),
        None => config::load_config(&PlatformPaths::resolve().config_dir),
    };

    util::logging::init(cli.debug, app_config.log_level.as_deref());

    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    tracing::info!(
        version = util::constants::APP_VERSION,
        debug = cli.debug,
        "LogSift starting"
    );

    match run(cli.command, &app_config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Output(e)) if e.kind() == io::ErrorKind::BrokenPipe => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Failures the front end reports: engine errors, bad arguments, and
/// errors writing to stdout.
#[derive(Debug)]
enum CliError {
    Engine(LogSiftError),
    Usage(String),
    Output(io::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "{e}"),
            Self::Usage(msg) => write!(f, "{msg}"),
            Self::Output(e) => write!(f, "failed to write output: {e}"),
        }
    }
}

impl From<LogSiftError> for CliError {
    fn from(e: LogSiftError) -> Self {
        Self::Engine(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::Output(e)
    }
}

fn run(command: Command, app_config: &AppConfig) -> Result<(), CliError> {
    match command {
        Command::Sort { sort } => {
            let result = sort_file(&sort, app_config)?;
            let errors = result.ordered_entries.error_slot();
            print_lines(result.ordered_entries)?;
            check_stream(&errors)
        }
        Command::Stats { sort, buckets } => {
            let result = sort_file(&sort, app_config)?;
            let buckets = buckets.unwrap_or(app_config.histogram_buckets).max(1);
            let SortResult {
                ordered_entries,
                malformed,
                ..
            } = result;
            let errors = ordered_entries.error_slot();
            let statistics = stats::analyze_with_buckets(ordered_entries.chain(malformed), buckets);
            check_stream(&errors)?;
            print_json(&statistics)
        }
        Command::Patterns { sort } => {
            let result = sort_file(&sort, app_config)?;
            let errors = result.ordered_entries.error_slot();
            let report = patterns::detect(result.ordered_entries, &app_config.detection)
                .map_err(LogSiftError::from)?;
            check_stream(&errors)?;
            print_json(&report)
        }
        Command::Filter { sort, filter } => {
            let spec = build_filter_spec(&filter)?;
            let compiled = spec.compile().map_err(LogSiftError::from)?;
            let result = sort_file(&sort, app_config)?;
            let errors = result.ordered_entries.error_slot();
            let mut filtered = compiled.apply(result.ordered_entries);
            print_lines(filtered.by_ref())?;
            check_stream(&errors)?;
            let stats = filtered.into_stats();
            tracing::info!(
                filter = %compiled.name(),
                examined = stats.examined,
                matched = stats.matched,
                "Filter complete"
            );
            Ok(())
        }
    }
}

/// Sort settings from the config file with the command-line overrides applied.
fn sort_config(args: &SortArgs, app_config: &AppConfig) -> SortConfig {
    let mut config = SortConfig::from_app_config(app_config);
    if let Some(bytes) = args.chunk_size {
        config.chunk_size_bytes = bytes;
    }
    if let Some(workers) = args.workers {
        config.max_workers = workers;
    }
    if args.best_effort {
        config.failure_policy = FailurePolicy::BestEffort;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout = timeout_from_secs(secs);
    }
    if let Some(placement) = args.malformed {
        config.malformed_placement = placement;
    }
    if let Some(dir) = &args.scratch_dir {
        config.scratch_dir = Some(dir.clone());
    }
    config
}

fn sort_file(args: &SortArgs, app_config: &AppConfig) -> Result<SortResult, CliError> {
    let sorter = LogSorter::new(sort_config(args, app_config)).map_err(LogSiftError::from)?;
    let result = sorter.sort_file(&args.file)?;

    for failure in &result.failed_chunks {
        eprintln!("Warning: skipped {failure}");
    }
    tracing::info!(
        file = %args.file.display(),
        lines = result.total_lines,
        malformed = result.malformed_count,
        chunks = result.chunks_used,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "Sorted"
    );
    Ok(result)
}

/// A timeout given in whole seconds; 0 means no limit, as in config.toml.
fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// A run file that failed while the stream was read cuts the output short.
fn check_stream(errors: &StreamErrorSlot) -> Result<(), CliError> {
    match errors.take() {
        Some(e) => Err(CliError::Engine(e)),
        None => Ok(()),
    }
}

/// Assemble the filter from the CLI flags. A JSON spec is used as-is;
/// otherwise the preset and the time/keyword flags are ANDed together.
fn build_filter_spec(args: &FilterArgs) -> Result<FilterSpec, CliError> {
    if let Some(path) = args.spec_json.as_deref() {
        return read_spec_json(path);
    }

    let mut spec = match args.preset.as_deref() {
        Some(name) => FilterSpec::preset(name).ok_or_else(|| {
            CliError::Usage(format!(
                "unknown preset '{name}' (expected one of: {})",
                logsift::core::filter::PRESET_NAMES.join(", ")
            ))
        })?,
        None => FilterSpec::new("cli", LogicalOp::And, Vec::new()),
    };

    if let Some(from) = &args.from {
        spec.conditions.push(FilterCondition::new(
            Field::Timestamp,
            Operator::Gte,
            FilterValue::Text(from.clone()),
        ));
    }
    if let Some(to) = &args.to {
        spec.conditions.push(FilterCondition::new(
            Field::Timestamp,
            Operator::Lt,
            FilterValue::Text(to.clone()),
        ));
    }
    if let Some(keyword) = &args.keyword {
        spec.conditions.push(FilterCondition::new(
            Field::Message,
            Operator::Contains,
            FilterValue::Text(keyword.clone()),
        ));
    }
    Ok(spec)
}

fn read_spec_json(path: &Path) -> Result<FilterSpec, CliError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::Usage(format!("could not read filter spec '{}': {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        CliError::Usage(format!("invalid filter spec '{}': {e}", path.display()))
    })
}

fn print_lines(entries: impl Iterator<Item = LogEntry>) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for entry in entries {
        writeln!(out, "{}", entry.raw_text)?;
    }
    out.flush()?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    serde_json::to_writer_pretty(&mut out, value).map_err(io::Error::from)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
