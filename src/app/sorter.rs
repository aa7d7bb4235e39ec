// LogSift - app/sorter.rs
//
// Chunk Sorter: the unit of parallel work. Reads one byte range, parses and
// sorts its lines, and spills the sorted run to a scratch file. Workers
// share nothing but the scratch directory; each opens its own read-only
// file handle and writes only its own run files.

use crate::core::merge::{Keyed, MergeKey};
use crate::core::model::{ChunkRange, MalformedPlacement};
use crate::core::parser;
use crate::platform::fs;
use crate::platform::runs::{self, RunFile, ScratchDir};
use crate::util::error::ChunkFailure;
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use std::time::Instant;

/// Position of a well-formed line that malformed lines can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub timestamp: DateTime<Utc>,
    pub offset: u64,
}

/// A finished chunk. Its records live in scratch files; the chunk itself
/// only carries their paths and counts.
#[derive(Debug)]
pub struct SortedChunk {
    pub range: ChunkRange,

    /// Records ascending by merge key: the well-formed entries and, under
    /// `Attached`, the malformed lines that follow one of them.
    pub run: Option<RunFile>,

    /// Malformed lines still to be placed, in file order. Under `Attached`
    /// only those before the chunk's first well-formed line; every
    /// malformed line otherwise.
    pub malformed_run: Option<RunFile>,

    /// Last well-formed line of the chunk in file order. Malformed lines at
    /// the start of the next chunk follow this one.
    pub last_anchor: Option<Anchor>,

    pub well_formed_count: usize,
    pub malformed_count: usize,
}

impl SortedChunk {
    /// Lines read, well-formed plus malformed.
    pub fn line_count(&self) -> usize {
        self.well_formed_count + self.malformed_count
    }
}

/// Read, parse and sort the lines of `range`, then spill the sorted run to
/// `scratch`.
///
/// Any I/O failure, including a short read because the file shrank or a
/// failed scratch write, fails this chunk only and names its byte range.
pub fn sort_chunk(
    path: &Path,
    range: ChunkRange,
    placement: MalformedPlacement,
    scratch: &ScratchDir,
) -> Result<SortedChunk, ChunkFailure> {
    let started = Instant::now();
    let failed = |stage: &'static str, source: io::Error| {
        tracing::warn!(
            chunk = range.id,
            start = range.start,
            end = range.end,
            stage,
            error = %source,
            "Chunk failed"
        );
        ChunkFailure {
            chunk_id: range.id,
            start: range.start,
            end: range.end,
            source,
        }
    };

    let bytes =
        fs::read_range(path, range.start, range.end).map_err(|e| failed("read", e))?;

    let mut timeline: Vec<Keyed> = Vec::new();
    let mut unplaced: Vec<Keyed> = Vec::new();
    let mut malformed_count = 0;
    let mut last_anchor: Option<Anchor> = None;

    for (offset, line) in fs::split_lines(&bytes, range.start) {
        let entry = parser::parse_line(&line, offset);
        if let (true, Some(timestamp)) = (entry.well_formed, entry.timestamp) {
            last_anchor = Some(Anchor { timestamp, offset });
            timeline.push(Keyed {
                key: MergeKey::timeline(timestamp, offset),
                entry,
            });
            continue;
        }

        tracing::trace!(
            chunk = range.id,
            offset,
            line = crate::util::logging::preview(&entry.raw_text),
            "Malformed line"
        );
        malformed_count += 1;
        match (placement, last_anchor) {
            (MalformedPlacement::Attached, Some(a)) => timeline.push(Keyed {
                key: MergeKey::attached(a.timestamp, a.offset, offset),
                entry,
            }),
            (MalformedPlacement::Attached, None) => unplaced.push(Keyed {
                key: MergeKey::leading(offset),
                entry,
            }),
            _ => unplaced.push(Keyed {
                key: MergeKey::trailing(offset),
                entry,
            }),
        }
    }
    drop(bytes);

    // Offsets are unique, so an unstable sort is still deterministic.
    timeline.sort_unstable_by_key(|k| k.key);

    let line_count = timeline.len() + unplaced.len();
    let well_formed_count = line_count - malformed_count;

    let run = runs::write_run(scratch.run_path(range.id, "run"), &timeline)
        .map_err(|e| failed("spill", e))?;
    let malformed_run = runs::write_run(scratch.run_path(range.id, "mal"), &unplaced)
        .map_err(|e| failed("spill", e))?;

    tracing::debug!(
        chunk = range.id,
        start = range.start,
        end = range.end,
        lines = line_count,
        malformed = malformed_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Chunk sorted"
    );

    Ok(SortedChunk {
        range,
        run,
        malformed_run,
        last_anchor,
        well_formed_count,
        malformed_count,
    })
}
