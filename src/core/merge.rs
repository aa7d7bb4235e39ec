// LogSift - core/merge.rs
//
// Streaming k-way merge of pre-sorted runs.
// Core layer: runs are plain iterators. Where their records live (memory
// or scratch files) is up to whoever builds them.
//
// One pending head per run sits in a min-heap. Each pull pops the smallest
// head and refills from the run it came from, so auxiliary memory is O(k)
// regardless of how many entries flow through.

use crate::core::model::LogEntry;
use crate::util::error::LogSiftError;
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

// =============================================================================
// Merge keys
// =============================================================================

/// Coarse position class. Declaration order is merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    /// Malformed lines that precede every well-formed line in the file.
    Leading,
    /// Well-formed lines, plus malformed lines attached to one of them.
    Timeline,
    /// Malformed lines emitted after the whole timeline.
    Trailing,
}

/// Total order used by the merge heap.
///
/// Fields compare in declaration order. A well-formed entry is keyed by its
/// own timestamp and offset (`anchor == offset`). A malformed entry attached
/// to a well-formed anchor borrows the anchor's timestamp and offset and
/// breaks the remaining tie with its own offset, which always lands it after
/// the anchor and before the next well-formed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MergeKey {
    pub band: Band,
    pub timestamp: Option<DateTime<Utc>>,
    pub anchor: u64,
    pub offset: u64,
}

impl MergeKey {
    /// Key of a well-formed entry.
    pub fn timeline(timestamp: DateTime<Utc>, offset: u64) -> Self {
        Self {
            band: Band::Timeline,
            timestamp: Some(timestamp),
            anchor: offset,
            offset,
        }
    }

    /// Key of a malformed entry that follows the well-formed line at
    /// `anchor_offset` with timestamp `anchor_ts`.
    pub fn attached(anchor_ts: DateTime<Utc>, anchor_offset: u64, offset: u64) -> Self {
        Self {
            band: Band::Timeline,
            timestamp: Some(anchor_ts),
            anchor: anchor_offset,
            offset,
        }
    }

    /// Key of a malformed entry with no preceding well-formed line.
    pub fn leading(offset: u64) -> Self {
        Self {
            band: Band::Leading,
            timestamp: None,
            anchor: 0,
            offset,
        }
    }

    /// Key of a malformed entry emitted after the timeline.
    pub fn trailing(offset: u64) -> Self {
        Self {
            band: Band::Trailing,
            timestamp: None,
            anchor: 0,
            offset,
        }
    }

    /// Key for a well-formed entry, `None` if it carries no timestamp.
    pub fn for_entry(entry: &LogEntry) -> Option<Self> {
        entry
            .timestamp
            .map(|ts| Self::timeline(ts, entry.source_offset))
    }
}

/// An entry paired with its merge key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyed {
    pub key: MergeKey,
    pub entry: LogEntry,
}

// =============================================================================
// Heap plumbing
// =============================================================================

struct HeapEntry {
    key: MergeKey,
    run_index: usize,
    entry: LogEntry,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then(self.run_index.cmp(&other.run_index))
    }
}

// =============================================================================
// KWayMerge
// =============================================================================

/// Lazy k-way merge over runs that are each sorted by [`MergeKey`].
///
/// Equal keys are resolved by run index, so the output is fully
/// deterministic. Empty runs never enter the heap.
pub struct KWayMerge<I>
where
    I: Iterator<Item = Keyed>,
{
    runs: Vec<I>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
}

impl<I> KWayMerge<I>
where
    I: Iterator<Item = Keyed>,
{
    pub fn new<R>(runs: R) -> Self
    where
        R: IntoIterator,
        R::IntoIter: Iterator<Item = I>,
    {
        let mut runs: Vec<I> = runs.into_iter().collect();
        let mut heap = BinaryHeap::with_capacity(runs.len());
        for (run_index, run) in runs.iter_mut().enumerate() {
            if let Some(Keyed { key, entry }) = run.next() {
                heap.push(Reverse(HeapEntry {
                    key,
                    run_index,
                    entry,
                }));
            }
        }
        Self { runs, heap }
    }

    /// Number of runs that still have a pending head.
    pub fn active_runs(&self) -> usize {
        self.heap.len()
    }
}

impl<I> Iterator for KWayMerge<I>
where
    I: Iterator<Item = Keyed>,
{
    type Item = Keyed;

    fn next(&mut self) -> Option<Keyed> {
        let Reverse(head) = self.heap.pop()?;
        if let Some(Keyed { key, entry }) = self.runs[head.run_index].next() {
            debug_assert!(key >= head.key, "merge run is not sorted");
            self.heap.push(Reverse(HeapEntry {
                key,
                run_index: head.run_index,
                entry,
            }));
        }
        Some(Keyed {
            key: head.key,
            entry: head.entry,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let pending = self.heap.len();
        self.runs.iter().fold((pending, Some(pending)), |(lo, hi), run| {
            let (rlo, rhi) = run.size_hint();
            (
                lo.saturating_add(rlo),
                hi.and_then(|h| rhi.and_then(|r| h.checked_add(r))),
            )
        })
    }
}

impl<I> ExactSizeIterator for KWayMerge<I> where I: ExactSizeIterator<Item = Keyed> {}

// =============================================================================
// Streams
// =============================================================================

/// A sorted run as the streams consume it.
pub type Run = Box<dyn ExactSizeIterator<Item = Keyed> + Send>;

/// First error hit while a stream was being consumed.
///
/// Iterators cannot return errors, so run readers record failures here and
/// end early. Clones share the slot; check it once the stream is drained.
#[derive(Debug, Clone, Default)]
pub struct StreamErrorSlot(Arc<Mutex<Option<LogSiftError>>>);

impl StreamErrorSlot {
    /// Keep `error` unless an earlier one is already recorded.
    pub fn record(&self, error: LogSiftError) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    pub fn take(&self) -> Option<LogSiftError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// The globally ordered output of a sort.
///
/// Finite, single-pass and non-restartable: entries are produced by the
/// merge as they are pulled. Consuming it again requires re-running the sort.
pub struct OrderedEntries {
    merge: KWayMerge<Run>,
    errors: StreamErrorSlot,
}

impl OrderedEntries {
    /// Build the stream from runs that are each sorted by key. Readers
    /// behind the runs report failures into `errors`.
    pub fn from_runs<R>(runs: R, errors: StreamErrorSlot) -> Self
    where
        R: IntoIterator<Item = Run>,
    {
        Self {
            merge: KWayMerge::new(runs),
            errors,
        }
    }

    pub fn empty() -> Self {
        Self::from_runs(Vec::new(), StreamErrorSlot::default())
    }

    /// Runs that still have entries pending.
    pub fn active_runs(&self) -> usize {
        self.merge.active_runs()
    }

    /// A handle on the error slot that outlives the stream.
    pub fn error_slot(&self) -> StreamErrorSlot {
        self.errors.clone()
    }

    /// The error that cut the stream short, if any.
    pub fn take_error(&self) -> Option<LogSiftError> {
        self.errors.take()
    }
}

impl Iterator for OrderedEntries {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        self.merge.next().map(|keyed| keyed.entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.merge.size_hint()
    }
}

impl ExactSizeIterator for OrderedEntries {}

impl fmt::Debug for OrderedEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedEntries")
            .field("remaining", &self.len())
            .field("active_runs", &self.merge.active_runs())
            .finish()
    }
}

/// Entries read run after run, in the order the runs were given.
///
/// Used for malformed lines kept out of the timeline: each run holds one
/// chunk's lines in file order and the runs are in chunk order.
pub struct MalformedEntries {
    runs: VecDeque<Run>,
    errors: StreamErrorSlot,
}

impl MalformedEntries {
    pub fn from_runs<R>(runs: R, errors: StreamErrorSlot) -> Self
    where
        R: IntoIterator<Item = Run>,
    {
        Self {
            runs: runs.into_iter().collect(),
            errors,
        }
    }

    pub fn empty() -> Self {
        Self::from_runs(Vec::new(), StreamErrorSlot::default())
    }

    pub fn error_slot(&self) -> StreamErrorSlot {
        self.errors.clone()
    }

    pub fn take_error(&self) -> Option<LogSiftError> {
        self.errors.take()
    }
}

impl Iterator for MalformedEntries {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        loop {
            let run = self.runs.front_mut()?;
            match run.next() {
                Some(keyed) => return Some(keyed.entry),
                None => {
                    self.runs.pop_front();
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.runs.iter().map(|run| run.len()).sum();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MalformedEntries {}

impl fmt::Debug for MalformedEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MalformedEntries")
            .field("remaining", &self.len())
            .field("runs", &self.runs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_line;

    fn keyed(line: &str, offset: u64) -> Keyed {
        let entry = parse_line(line, offset);
        let key = MergeKey::for_entry(&entry).unwrap();
        Keyed { key, entry }
    }

    fn loose(line: &str, offset: u64) -> Keyed {
        Keyed {
            key: MergeKey::trailing(offset),
            entry: parse_line(line, offset),
        }
    }

    fn run(records: Vec<Keyed>) -> Run {
        Box::new(records.into_iter())
    }

    fn merge_runs(runs: Vec<Vec<Keyed>>) -> Vec<LogEntry> {
        OrderedEntries::from_runs(runs.into_iter().map(run), StreamErrorSlot::default()).collect()
    }

    fn offsets(entries: &[LogEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.source_offset).collect()
    }

    #[test]
    fn test_merge_interleaves_runs_by_timestamp() {
        let a = vec![
            keyed("2024-01-15 10:00:01 INFO a1", 0),
            keyed("2024-01-15 10:00:04 INFO a4", 10),
        ];
        let b = vec![
            keyed("2024-01-15 10:00:02 INFO b2", 100),
            keyed("2024-01-15 10:00:03 INFO b3", 110),
        ];
        let c = vec![keyed("2024-01-15 10:00:00 INFO c0", 200)];

        let merged = merge_runs(vec![a, b, c]);
        assert_eq!(offsets(&merged), vec![200, 0, 100, 110, 10]);
    }

    #[test]
    fn test_equal_timestamps_ordered_by_offset() {
        let a = vec![keyed("2024-01-15 10:00:00 INFO late", 500)];
        let b = vec![keyed("2024-01-15 10:00:00 INFO early", 20)];
        let merged = merge_runs(vec![a, b]);
        assert_eq!(offsets(&merged), vec![20, 500]);
    }

    #[test]
    fn test_empty_runs_contribute_nothing() {
        let merge = KWayMerge::new(vec![
            Vec::new().into_iter(),
            vec![keyed("2024-01-15 10:00:00 INFO x", 0)].into_iter(),
            Vec::new().into_iter(),
        ]);
        assert_eq!(merge.active_runs(), 1);
        assert_eq!(merge.len(), 1);
        assert_eq!(merge.count(), 1);

        assert_eq!(OrderedEntries::empty().count(), 0);
    }

    #[test]
    fn test_exact_size_tracks_consumption() {
        let mut stream = OrderedEntries::from_runs(
            vec![
                run(vec![
                    keyed("2024-01-15 10:00:00 INFO a", 0),
                    keyed("2024-01-15 10:00:02 INFO b", 10),
                ]),
                run(vec![keyed("2024-01-15 10:00:01 INFO c", 20)]),
            ],
            StreamErrorSlot::default(),
        );
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.active_runs(), 2);
        stream.next();
        assert_eq!(stream.len(), 2);
        stream.next();
        assert_eq!(stream.active_runs(), 1);
        stream.next();
        assert_eq!(stream.len(), 0);
        assert_eq!(stream.active_runs(), 0);
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_attached_key_sits_between_anchor_and_next_entry() {
        let anchor = parse_line("2024-01-15 10:00:00 ERROR header", 0);
        let next = parse_line("2024-01-15 10:00:00 INFO after", 40);
        let ts = anchor.timestamp.unwrap();

        let anchor_key = MergeKey::for_entry(&anchor).unwrap();
        let cont1 = MergeKey::attached(ts, 0, 20);
        let cont2 = MergeKey::attached(ts, 0, 30);
        let next_key = MergeKey::for_entry(&next).unwrap();

        assert!(anchor_key < cont1);
        assert!(cont1 < cont2);
        assert!(cont2 < next_key);
    }

    #[test]
    fn test_bands_bracket_the_timeline() {
        let ts = parse_line("1999-01-01 00:00:00 x", 0).timestamp.unwrap();
        assert!(MergeKey::leading(900) < MergeKey::timeline(ts, 0));
        assert!(MergeKey::timeline(ts, 900) < MergeKey::trailing(1));
    }

    #[test]
    fn test_output_independent_of_run_split() {
        let lines: Vec<Keyed> = (0..20u64)
            .map(|i| {
                let sec = (i * 7) % 10;
                keyed(&format!("2024-01-15 10:00:0{sec} INFO n{i}"), i * 100)
            })
            .collect();

        let mut single = lines.clone();
        single.sort_by(|a, b| a.key.cmp(&b.key));
        let expected = merge_runs(vec![single]);

        let mut runs: Vec<Vec<Keyed>> = lines.chunks(3).map(|c| c.to_vec()).collect();
        for run in &mut runs {
            run.sort_by(|a, b| a.key.cmp(&b.key));
        }
        assert_eq!(merge_runs(runs), expected);
    }

    #[test]
    fn test_malformed_entries_follow_run_order() {
        let mut stream = MalformedEntries::from_runs(
            vec![
                run(vec![loose("first", 0), loose("second", 10)]),
                run(Vec::new()),
                run(vec![loose("third", 20)]),
            ],
            StreamErrorSlot::default(),
        );
        assert_eq!(stream.len(), 3);
        stream.next();
        assert_eq!(stream.len(), 2);
        let rest: Vec<String> = stream.map(|e| e.raw_text).collect();
        assert_eq!(rest, vec!["second", "third"]);
        assert_eq!(MalformedEntries::empty().count(), 0);
    }

    #[test]
    fn test_error_slot_keeps_first_error() {
        let stream = OrderedEntries::empty();
        let slot = stream.error_slot();
        assert!(stream.take_error().is_none());

        slot.record(LogSiftError::Io {
            path: "a.run".into(),
            operation: "read run",
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "first"),
        });
        slot.record(LogSiftError::Io {
            path: "b.run".into(),
            operation: "read run",
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "second"),
        });
        let err = stream.take_error().unwrap();
        assert!(err.to_string().contains("a.run"), "{err}");
        assert!(slot.take().is_none());
    }
}
