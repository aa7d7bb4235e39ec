// LogSift - platform/chunking.rs
//
// Chunk Splitter: partitions a file into contiguous, line-aligned byte
// ranges for parallel sorting. The file is memory-mapped read-only and only
// the bytes around each boundary are touched, so splitting a multi-gigabyte
// file costs a handful of page faults rather than a full read.

use crate::core::model::ChunkRange;
use crate::util::error::LogSiftError;
use memchr::{memchr, memrchr};
use std::fs::File;
use std::io;
use std::path::Path;

/// Split `path` into line-aligned ranges of roughly `target_chunk_bytes`.
///
/// - An empty file yields no ranges.
/// - A file no larger than the target yields a single range.
/// - At most `max_chunks` ranges are produced. When the size-driven count
///   would exceed it, the target grows to `ceil(len / max_chunks)`.
/// - Each boundary is the byte after the last newline that keeps the chunk
///   within the target. A line longer than the target extends its chunk to
///   the next newline (or EOF).
///
/// Fails if the file cannot be opened or mapped, or if its length changes
/// between the metadata read and the mapping.
pub fn split_file(
    path: &Path,
    target_chunk_bytes: u64,
    max_chunks: usize,
) -> Result<Vec<ChunkRange>, LogSiftError> {
    let io_err = |operation: &'static str| {
        move |source: io::Error| LogSiftError::Io {
            path: path.to_path_buf(),
            operation,
            source,
        }
    };

    let file = File::open(path).map_err(io_err("open"))?;
    let len = file.metadata().map_err(io_err("metadata"))?.len();

    if len == 0 {
        tracing::debug!(path = %path.display(), "Empty input; no chunks");
        return Ok(Vec::new());
    }

    let max_chunks = max_chunks.max(1) as u64;
    let target = target_chunk_bytes.max(1).max(len.div_ceil(max_chunks));

    if len <= target {
        tracing::debug!(path = %path.display(), bytes = len, "Input fits in a single chunk");
        return Ok(vec![ChunkRange {
            id: 0,
            start: 0,
            end: len,
        }]);
    }

    // SAFETY: the map is read-only and never outlives `file`. Concurrent
    // truncation by another process is detected by the length check below
    // for the common case; the sorters re-read their ranges with ordinary
    // I/O and report short reads as chunk failures.
    let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(io_err("mmap"))?;
    if mmap.len() as u64 != len {
        return Err(io_err("scan")(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "file length changed during scan (expected {len} bytes, mapped {})",
                mmap.len()
            ),
        )));
    }

    let bytes: &[u8] = &mmap;
    let total = bytes.len();
    let target = usize::try_from(target).unwrap_or(usize::MAX);
    let mut ranges = Vec::new();
    let mut start = 0usize;

    while start < total {
        let last_allowed = ranges.len() as u64 + 1 == max_chunks;
        let end = if last_allowed || total - start <= target {
            total
        } else {
            let limit = start + target;
            match memrchr(b'\n', &bytes[start..limit]) {
                Some(pos) => start + pos + 1,
                // No newline inside the window: the line is longer than the
                // target, so the chunk runs to the end of that line.
                None => match memchr(b'\n', &bytes[limit..]) {
                    Some(pos) => limit + pos + 1,
                    None => total,
                },
            }
        };

        ranges.push(ChunkRange {
            id: ranges.len(),
            start: start as u64,
            end: end as u64,
        });
        start = end;
    }

    tracing::debug!(
        path = %path.display(),
        bytes = len,
        chunk_target = target,
        chunks = ranges.len(),
        "File split into chunks"
    );

    Ok(ranges)
}
