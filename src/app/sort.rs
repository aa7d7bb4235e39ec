// LogSift - app/sort.rs
//
// Sort orchestration: split -> parallel chunk sort -> k-way merge.
//
// Architecture:
//   - The splitter and this orchestrator run on the calling thread.
//   - Chunk sorters run on a dedicated rayon pool sized to the worker
//     ceiling. They share no mutable state; each spills its sorted run to a
//     per-sort scratch directory and returns the file paths.
//   - The merge reads the run files back lazily. Each file is deleted once
//     drained and the directory goes when the result streams are dropped.
//   - A cloneable `CancelToken` and an optional wall-time ceiling are
//     checked before each chunk starts. Chunks not yet started are skipped.
//   - Final order depends only on merge keys, never on completion order.

use crate::core::merge::{
    Keyed, MalformedEntries, MergeKey, OrderedEntries, Run, StreamErrorSlot,
};
use crate::core::model::{ChunkRange, FailurePolicy, MalformedPlacement};
use crate::platform::chunking;
use crate::platform::config::AppConfig;
use crate::platform::runs::{RunReader, ScratchDir};
use crate::util::constants;
use crate::util::error::{ChunkFailure, ConfigError, LogSiftError, SortError};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::sorter::{self, Anchor, SortedChunk};

// =============================================================================
// Configuration
// =============================================================================

/// Parameters of one sort invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortConfig {
    /// Target bytes per chunk.
    pub chunk_size_bytes: u64,
    /// Worker ceiling; 0 = host parallelism.
    pub max_workers: usize,
    pub failure_policy: FailurePolicy,
    /// Wall-time ceiling for the chunk phase.
    pub timeout: Option<Duration>,
    pub malformed_placement: MalformedPlacement,
    /// Parent of the per-sort scratch directory; `None` = system temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: constants::DEFAULT_CHUNK_SIZE_BYTES,
            max_workers: constants::DEFAULT_MAX_WORKERS,
            failure_policy: FailurePolicy::default(),
            timeout: None,
            malformed_placement: MalformedPlacement::default(),
            scratch_dir: None,
        }
    }
}

impl SortConfig {
    /// Sort settings from a loaded config file.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            chunk_size_bytes: config.chunk_size_bytes,
            max_workers: config.max_workers,
            failure_policy: config.failure_policy,
            timeout: config.timeout_secs.map(Duration::from_secs),
            malformed_placement: config.malformed_placement,
            scratch_dir: config.scratch_dir.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(constants::MIN_CHUNK_SIZE_BYTES..=constants::MAX_CHUNK_SIZE_BYTES)
            .contains(&self.chunk_size_bytes)
        {
            return Err(ConfigError::out_of_range(
                "sort.chunk_size_bytes",
                self.chunk_size_bytes,
                format!(
                    "{}..={}",
                    constants::MIN_CHUNK_SIZE_BYTES,
                    constants::MAX_CHUNK_SIZE_BYTES
                ),
            ));
        }
        if self.max_workers > constants::ABSOLUTE_MAX_WORKERS {
            return Err(ConfigError::out_of_range(
                "sort.max_workers",
                self.max_workers,
                format!("0..={} (0 = auto)", constants::ABSOLUTE_MAX_WORKERS),
            ));
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() || timeout.as_secs() > constants::MAX_SORT_TIMEOUT_SECS {
                return Err(ConfigError::out_of_range(
                    "sort.timeout",
                    format!("{:.3}s", timeout.as_secs_f64()),
                    format!("greater than 0 and at most {}s", constants::MAX_SORT_TIMEOUT_SECS),
                ));
            }
        }
        Ok(())
    }

    /// The worker ceiling with auto-detection resolved.
    pub fn effective_workers(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get().clamp(1, constants::ABSOLUTE_MAX_WORKERS)
        } else {
            self.max_workers
        }
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Cooperative cancellation flag shared between a caller and a running sort.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Chunks already running finish; the rest are skipped.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Result
// =============================================================================

/// Outcome of a sort. Produced once per invocation.
#[derive(Debug)]
pub struct SortResult {
    /// Globally ordered entries, merged lazily as they are pulled.
    pub ordered_entries: OrderedEntries,
    pub total_lines: usize,
    pub well_formed_count: usize,
    pub malformed_count: usize,
    /// Malformed entries in file order when placement is `Separate`;
    /// empty otherwise (they are in `ordered_entries`).
    pub malformed: MalformedEntries,
    /// Number of chunks the input was split into.
    pub chunks_used: usize,
    /// Chunks skipped under the best-effort policy. Their lines are in no count.
    pub failed_chunks: Vec<ChunkFailure>,
    /// Time to split and sort every chunk. The merge itself runs lazily.
    pub elapsed: Duration,
}

enum ChunkOutcome {
    Sorted(SortedChunk),
    Failed(ChunkFailure),
    Cancelled,
    TimedOut,
}

// =============================================================================
// LogSorter
// =============================================================================

/// Parallel chunked sorter for one file at a time.
#[derive(Debug, Clone)]
pub struct LogSorter {
    config: SortConfig,
    cancel: CancelToken,
}

impl LogSorter {
    /// Create a sorter. The config is validated before any I/O.
    pub fn new(config: SortConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Use `token` to cancel this sorter from another thread.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Sort `path` and return the ordered stream with its counts.
    pub fn sort_file(&self, path: &Path) -> Result<SortResult, LogSiftError> {
        let started = Instant::now();
        let workers = self.config.effective_workers();

        tracing::info!(
            path = %path.display(),
            chunk_size = self.config.chunk_size_bytes,
            workers,
            "Sort started"
        );

        let ranges = chunking::split_file(path, self.config.chunk_size_bytes, workers)?;
        self.sort_ranges(path, ranges, started)
    }

    pub(crate) fn sort_ranges(
        &self,
        path: &Path,
        ranges: Vec<ChunkRange>,
        started: Instant,
    ) -> Result<SortResult, LogSiftError> {
        let total = ranges.len();
        if ranges.is_empty() {
            return Ok(SortResult {
                ordered_entries: OrderedEntries::empty(),
                total_lines: 0,
                well_formed_count: 0,
                malformed_count: 0,
                malformed: MalformedEntries::empty(),
                chunks_used: 0,
                failed_chunks: Vec::new(),
                elapsed: started.elapsed(),
            });
        }

        let scratch = ScratchDir::create(self.config.scratch_dir.as_deref())?;
        let outcomes = self.run_workers(path, &ranges, &scratch, started)?;

        let mut sorted = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut cancelled = false;
        let mut timed_out = false;
        for outcome in outcomes {
            match outcome {
                ChunkOutcome::Sorted(chunk) => sorted.push(chunk),
                ChunkOutcome::Failed(failure) => failures.push(failure),
                ChunkOutcome::Cancelled => cancelled = true,
                ChunkOutcome::TimedOut => timed_out = true,
            }
        }
        let completed = sorted.len();

        if cancelled {
            tracing::info!(completed, total, "Sort cancelled");
            return Err(SortError::Cancelled { completed, total }.into());
        }
        if timed_out {
            let limit = self.config.timeout.unwrap_or_default();
            tracing::warn!(completed, total, limit_ms = limit.as_millis() as u64, "Sort timed out");
            return Err(SortError::TimedOut {
                completed,
                total,
                limit,
            }
            .into());
        }
        if !failures.is_empty() {
            match self.config.failure_policy {
                FailurePolicy::Abort => {
                    return Err(SortError::ChunksFailed { failures }.into());
                }
                FailurePolicy::BestEffort => {
                    for f in &failures {
                        tracing::warn!(
                            chunk = f.chunk_id,
                            start = f.start,
                            end = f.end,
                            error = %f.source,
                            "Chunk skipped (best effort)"
                        );
                    }
                }
            }
        }

        let mut result = assemble(sorted, self.config.malformed_placement, &scratch)?;
        result.chunks_used = total;
        result.failed_chunks = failures;
        result.elapsed = started.elapsed();

        tracing::info!(
            path = %path.display(),
            lines = result.total_lines,
            well_formed = result.well_formed_count,
            malformed = result.malformed_count,
            chunks = total,
            failed = result.failed_chunks.len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Sort complete"
        );

        Ok(result)
    }

    /// Fan the ranges out over a dedicated pool. Outcomes come back in
    /// range order regardless of which worker finished first.
    fn run_workers(
        &self,
        path: &Path,
        ranges: &[ChunkRange],
        scratch: &ScratchDir,
        started: Instant,
    ) -> Result<Vec<ChunkOutcome>, SortError> {
        let threads = self.config.effective_workers().min(ranges.len()).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("logsift-sort-{i}"))
            .build()
            .map_err(|e| SortError::WorkerPool {
                reason: e.to_string(),
            })?;

        let deadline = self.config.timeout.map(|t| started + t);
        let cancel = &self.cancel;
        let placement = self.config.malformed_placement;

        tracing::debug!(threads, chunks = ranges.len(), "Dispatching chunk sorters");

        Ok(pool.install(|| {
            ranges
                .par_iter()
                .map(|range| {
                    if cancel.is_cancelled() {
                        return ChunkOutcome::Cancelled;
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return ChunkOutcome::TimedOut;
                    }
                    match sorter::sort_chunk(path, *range, placement, scratch) {
                        Ok(chunk) => ChunkOutcome::Sorted(chunk),
                        Err(failure) => ChunkOutcome::Failed(failure),
                    }
                })
                .collect()
        }))
    }
}

/// Open the spilled runs of the sorted chunks (in file order) as the result
/// streams and total up the counts.
///
/// Malformed lines at the start of a chunk take the last well-formed line of
/// an earlier chunk as their anchor, so `Attached` placement does not depend
/// on where the chunk boundaries fell.
fn assemble(
    chunks: Vec<SortedChunk>,
    placement: MalformedPlacement,
    scratch: &ScratchDir,
) -> Result<SortResult, LogSiftError> {
    let errors = StreamErrorSlot::default();
    let mut runs: Vec<Run> = Vec::with_capacity(chunks.len() * 2);
    let mut separate: Vec<Run> = Vec::new();
    let mut total_lines = 0;
    let mut well_formed_count = 0;
    let mut malformed_count = 0;
    let mut carried: Option<Anchor> = None;

    for chunk in chunks {
        total_lines += chunk.line_count();
        well_formed_count += chunk.well_formed_count;
        malformed_count += chunk.malformed_count;

        if let Some(run) = chunk.run {
            runs.push(Box::new(RunReader::open(run, scratch, errors.clone())?));
        }
        if let Some(run) = chunk.malformed_run {
            let reader = RunReader::open(run, scratch, errors.clone())?;
            match placement {
                MalformedPlacement::Separate => separate.push(Box::new(reader)),
                // Already keyed after the timeline, by offset.
                MalformedPlacement::Trailing => runs.push(Box::new(reader)),
                MalformedPlacement::Attached => {
                    let anchor = carried;
                    runs.push(Box::new(reader.map(move |Keyed { entry, .. }| {
                        let offset = entry.source_offset;
                        let key = match anchor {
                            Some(a) => MergeKey::attached(a.timestamp, a.offset, offset),
                            None => MergeKey::leading(offset),
                        };
                        Keyed { key, entry }
                    })));
                }
            }
        }
        carried = chunk.last_anchor.or(carried);
    }

    Ok(SortResult {
        ordered_entries: OrderedEntries::from_runs(runs, errors.clone()),
        total_lines,
        well_formed_count,
        malformed_count,
        malformed: MalformedEntries::from_runs(separate, errors),
        chunks_used: 0,
        failed_chunks: Vec::new(),
        elapsed: Duration::ZERO,
    })
}
